// Built-in server catalog

use crate::types::ServerDescriptor;

const CATALOG: [(&str, &str, &str, &str); 10] = [
    ("United States", "us", "\u{1F1FA}\u{1F1F8}", "dkt-us"),
    ("United Kingdom", "uk", "\u{1F1EC}\u{1F1E7}", "dkt-uk"),
    ("Germany", "de", "\u{1F1E9}\u{1F1EA}", "dkt-de"),
    ("Japan", "jp", "\u{1F1EF}\u{1F1F5}", "dkt-jp"),
    ("Canada", "ca", "\u{1F1E8}\u{1F1E6}", "dkt-ca"),
    ("Australia", "au", "\u{1F1E6}\u{1F1FA}", "dkt-au"),
    ("Brazil", "br", "\u{1F1E7}\u{1F1F7}", "dkt-br"),
    ("France", "fr", "\u{1F1EB}\u{1F1F7}", "dkt-fr"),
    ("Netherlands", "nl", "\u{1F1F3}\u{1F1F1}", "dkt-nl"),
    ("Singapore", "sg", "\u{1F1F8}\u{1F1EC}", "dkt-sg"),
];

/// The stock server locations, in display order
pub fn default_servers() -> Vec<ServerDescriptor> {
    CATALOG
        .iter()
        .map(|(name, code, glyph, tunnel_id)| ServerDescriptor::new(*name, *code, *glyph, *tunnel_id))
        .collect()
}

/// Look up a stock server by tunnel id or country code, ignoring case
pub fn find_server(key: &str) -> Option<ServerDescriptor> {
    default_servers().into_iter().find(|server| {
        server.tunnel_id.eq_ignore_ascii_case(key) || server.country_code.eq_ignore_ascii_case(key)
    })
}
