//! WireGuard config rendering and flat-file peer stanza operations
//!
//! Each managed peer in the gateway config is keyed by a `### Client <name>`
//! comment line directly above its `[Peer]` block. That marker is the only
//! durable handle for locating a stanza later, so it is preserved verbatim.

use crate::allocator::PeerAddresses;

/// Marker comment identifying one peer's stanza in the gateway config
pub fn client_marker(name: &str) -> String {
    format!("### Client {}", name)
}

/// Inputs for rendering a client-side config
pub struct ClientConfigParams<'a> {
    pub private_key: &'a str,
    pub preshared_key: &'a str,
    pub addresses: &'a PeerAddresses,
    pub dns: &'a [String],
    pub server_public_key: &'a str,
    pub endpoint: &'a str,
    pub allowed_ips: &'a str,
}

/// Render the client-side config file contents
pub fn render_client_config(params: &ClientConfigParams<'_>) -> String {
    format!(
        "[Interface]\n\
         PrivateKey = {private_key}\n\
         Address = {addresses}\n\
         DNS = {dns}\n\
         \n\
         [Peer]\n\
         PublicKey = {server_public_key}\n\
         PresharedKey = {preshared_key}\n\
         Endpoint = {endpoint}\n\
         AllowedIPs = {allowed_ips}\n",
        private_key = params.private_key,
        addresses = params.addresses.cidr_pair(),
        dns = params.dns.join(","),
        server_public_key = params.server_public_key,
        preshared_key = params.preshared_key,
        endpoint = params.endpoint,
        allowed_ips = params.allowed_ips,
    )
}

/// Render the gateway-side stanza for one peer
pub fn render_gateway_stanza(
    name: &str,
    public_key: &str,
    preshared_key: &str,
    addresses: &PeerAddresses,
) -> String {
    format!(
        "{marker}\n\
         [Peer]\n\
         PublicKey = {public_key}\n\
         PresharedKey = {preshared_key}\n\
         AllowedIPs = {addresses}\n",
        marker = client_marker(name),
        public_key = public_key,
        preshared_key = preshared_key,
        addresses = addresses.cidr_pair(),
    )
}

/// Whether the config already holds a stanza for `name` (exact marker match)
pub fn contains_client(config_text: &str, name: &str) -> bool {
    let marker = client_marker(name);
    config_text.lines().any(|line| line == marker)
}

/// Names of all managed peers present in the config
pub fn client_names(config_text: &str) -> Vec<String> {
    config_text
        .lines()
        .filter_map(|line| line.strip_prefix("### Client "))
        .map(str::to_string)
        .collect()
}

/// Append a stanza, separated from preceding content by a blank line
pub fn append_stanza(config_text: &str, stanza: &str) -> String {
    let mut out = config_text.to_string();
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    if !out.is_empty() && !out.ends_with("\n\n") {
        out.push('\n');
    }
    out.push_str(stanza);
    out
}

/// Split `name`'s stanza out of the config.
///
/// Returns the remaining config text and the extracted stanza (marker line
/// through the end of its contiguous block, trailing newline included).
pub fn split_stanza(config_text: &str, name: &str) -> Option<(String, String)> {
    let marker = client_marker(name);
    let lines: Vec<&str> = config_text.lines().collect();
    let marker_idx = lines.iter().position(|line| *line == marker)?;

    let mut end = marker_idx + 1;
    while end < lines.len() && !lines[end].is_empty() && !lines[end].starts_with("### Client ") {
        end += 1;
    }

    // eat the blank separator line on one side
    let start = if marker_idx > 0 && lines[marker_idx - 1].is_empty() {
        marker_idx - 1
    } else {
        marker_idx
    };
    let after = if end < lines.len() && lines[end].is_empty() && start == marker_idx {
        end + 1
    } else {
        end
    };

    let mut remaining = lines[..start].join("\n");
    if after < lines.len() {
        if !remaining.is_empty() {
            remaining.push('\n');
        }
        remaining.push_str(&lines[after..].join("\n"));
    }
    if !remaining.is_empty() {
        remaining.push('\n');
    }

    let mut stanza = lines[marker_idx..end].join("\n");
    stanza.push('\n');

    Some((remaining, stanza))
}

/// Public key recorded in `name`'s stanza
pub fn extract_public_key(config_text: &str, name: &str) -> Option<String> {
    let marker = client_marker(name);
    let mut in_stanza = false;
    for line in config_text.lines() {
        if line == marker {
            in_stanza = true;
            continue;
        }
        if in_stanza {
            if line.starts_with("### Client ") || line.is_empty() {
                return None;
            }
            if let Some(key) = line.strip_prefix("PublicKey = ") {
                return Some(key.trim().to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addrs() -> PeerAddresses {
        PeerAddresses {
            v4: "10.66.66.2".parse().unwrap(),
            v6: "fd42:42:42::2".parse().unwrap(),
        }
    }

    fn base_config() -> String {
        "[Interface]\nPrivateKey = serverkey\nAddress = 10.66.66.1/24\nListenPort = 51820\n"
            .to_string()
    }

    #[test]
    fn test_render_client_config() {
        let params = ClientConfigParams {
            private_key: "priv",
            preshared_key: "psk",
            addresses: &addrs(),
            dns: &["1.1.1.1".to_string(), "1.0.0.1".to_string()],
            server_public_key: "serverpub",
            endpoint: "vpn.example.net:51820",
            allowed_ips: "0.0.0.0/0,::/0",
        };
        let conf = render_client_config(&params);
        assert!(conf.starts_with("[Interface]\nPrivateKey = priv\n"));
        assert!(conf.contains("Address = 10.66.66.2/32,fd42:42:42::2/128\n"));
        assert!(conf.contains("DNS = 1.1.1.1,1.0.0.1\n"));
        assert!(conf.contains("Endpoint = vpn.example.net:51820\n"));
    }

    #[test]
    fn test_marker_is_exact() {
        let stanza = render_gateway_stanza("4242", "pub", "psk", &addrs());
        let config = append_stanza(&base_config(), &stanza);
        assert!(contains_client(&config, "4242"));
        assert!(!contains_client(&config, "424"));
        assert!(!contains_client(&config, "42421"));
    }

    #[test]
    fn test_client_names() {
        let mut config = base_config();
        for name in ["100", "200"] {
            let stanza = render_gateway_stanza(name, "pub", "psk", &addrs());
            config = append_stanza(&config, &stanza);
        }
        assert_eq!(client_names(&config), vec!["100", "200"]);
    }

    #[test]
    fn test_split_stanza_roundtrip() {
        let stanza_a = render_gateway_stanza("100", "puba", "pska", &addrs());
        let stanza_b = render_gateway_stanza("200", "pubb", "pskb", &addrs());
        let config = append_stanza(&append_stanza(&base_config(), &stanza_a), &stanza_b);

        let (remaining, extracted) = split_stanza(&config, "100").unwrap();
        assert_eq!(extracted, stanza_a);
        assert!(!contains_client(&remaining, "100"));
        assert!(contains_client(&remaining, "200"));

        // restoring the stanza brings the peer back
        let restored = append_stanza(&remaining, &extracted);
        assert!(contains_client(&restored, "100"));
    }

    #[test]
    fn test_split_last_stanza_leaves_clean_config() {
        let stanza = render_gateway_stanza("100", "pub", "psk", &addrs());
        let config = append_stanza(&base_config(), &stanza);

        let (remaining, _) = split_stanza(&config, "100").unwrap();
        assert_eq!(remaining, base_config());
    }

    #[test]
    fn test_split_missing_stanza() {
        assert!(split_stanza(&base_config(), "100").is_none());
    }

    #[test]
    fn test_extract_public_key() {
        let stanza = render_gateway_stanza("100", "the-public-key", "psk", &addrs());
        let config = append_stanza(&base_config(), &stanza);
        assert_eq!(
            extract_public_key(&config, "100").as_deref(),
            Some("the-public-key")
        );
        assert_eq!(extract_public_key(&config, "200"), None);
    }
}
