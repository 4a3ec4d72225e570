//! Peer Info
//!
//! Builds the `IV_*` key/value block the client advertises during
//! authentication.

use std::collections::BTreeMap;

/// Client capabilities advertised to the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub ui_version: String,
    pub platform: String,
    pub lzo_supported: bool,
    pub ssl_version: Option<String>,
}

impl Default for PeerInfo {
    fn default() -> Self {
        Self {
            ui_version: format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            platform: std::env::consts::OS.to_string(),
            lzo_supported: false,
            ssl_version: None,
        }
    }
}

impl PeerInfo {
    /// Render as newline-terminated `KEY=value` lines
    ///
    /// Extra pairs (e.g. `IV_CIPHERS`) follow the baseline in key order.
    pub fn render(&self, extra: &BTreeMap<String, String>) -> String {
        let mut lines = vec![
            "IV_VER=2.4".to_string(),
            format!("IV_UI_VER={}", self.ui_version),
            "IV_PROTO=2".to_string(),
            "IV_NCP=2".to_string(),
            "IV_LZO_STUB=1".to_string(),
        ];
        if self.lzo_supported {
            lines.push("IV_LZO=1".to_string());
        }
        if let Some(ssl) = &self.ssl_version {
            lines.push(format!("IV_SSL={ssl}"));
        }
        lines.push(format!("IV_PLAT={}", self.platform));
        lines.extend(extra.iter().map(|(k, v)| format!("{k}={v}")));

        let mut rendered = lines.join("\n");
        rendered.push('\n');
        rendered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_baseline() {
        let info = PeerInfo {
            ui_version: "test 1.0".into(),
            platform: "linux".into(),
            lzo_supported: false,
            ssl_version: None,
        };
        assert_eq!(
            info.render(&BTreeMap::new()),
            "IV_VER=2.4\nIV_UI_VER=test 1.0\nIV_PROTO=2\nIV_NCP=2\nIV_LZO_STUB=1\nIV_PLAT=linux\n"
        );
    }

    #[test]
    fn test_render_with_extras() {
        let info = PeerInfo {
            lzo_supported: true,
            ssl_version: Some("OpenSSL 3.0".into()),
            ..Default::default()
        };
        let mut extra = BTreeMap::new();
        extra.insert("IV_CIPHERS".to_string(), "AES-256-GCM:AES-128-GCM".to_string());

        let rendered = info.render(&extra);
        assert!(rendered.contains("IV_LZO=1\nIV_SSL=OpenSSL 3.0\n"));
        assert!(rendered.ends_with("IV_CIPHERS=AES-256-GCM:AES-128-GCM\n"));
    }
}
