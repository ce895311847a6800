//! Handshake attributes declared by a peer when it connects.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use sigrelay_core::AppResult;
use sigrelay_core::error::AppError;

use super::handle::PeerRole;

/// Metadata a peer supplies in its connection URL.
///
/// `type` selects the role and is mandatory. `id` (or `streamerId`) is an
/// optional requested peer id for producer roles. `insid` and `projectid`
/// are opaque deployment tags kept for logging; anything else lands in
/// `extra`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionAttributes {
    pub role: PeerRole,
    pub requested_id: Option<String>,
    pub instance_id: Option<String>,
    pub project_id: Option<String>,
    pub extra: BTreeMap<String, String>,
}

impl ConnectionAttributes {
    /// Attributes carrying only a role.
    pub fn new(role: PeerRole) -> Self {
        Self {
            role,
            requested_id: None,
            instance_id: None,
            project_id: None,
            extra: BTreeMap::new(),
        }
    }

    /// Build attributes from already URL-decoded key/value pairs.
    ///
    /// Keys are trimmed and matched case-insensitively. Blank values are
    /// treated as absent.
    pub fn from_pairs<I, K, V>(pairs: I) -> AppResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut role = None;
        let mut requested_id = None;
        let mut instance_id = None;
        let mut project_id = None;
        let mut extra = BTreeMap::new();

        for (key, value) in pairs {
            let key = key.as_ref().trim();
            let value = value.as_ref().trim();
            if key.is_empty() {
                continue;
            }
            let present = (!value.is_empty()).then(|| value.to_string());

            match key.to_ascii_lowercase().as_str() {
                "type" => {
                    let parsed = value.parse::<PeerRole>().map_err(AppError::validation)?;
                    role = Some(parsed);
                }
                "id" | "streamerid" => requested_id = present.or(requested_id),
                "insid" => instance_id = present,
                "projectid" => project_id = present,
                _ => {
                    extra.insert(key.to_string(), value.to_string());
                }
            }
        }

        let role = role.ok_or_else(|| AppError::validation("Missing connection type attribute"))?;

        Ok(Self {
            role,
            requested_id,
            instance_id,
            project_id,
            extra,
        })
    }

    /// Look up an attribute that is not one of the well-known keys.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.extra.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigrelay_core::ErrorKind;

    #[test]
    fn parses_streamer_with_deployment_tags() {
        let attrs = ConnectionAttributes::from_pairs([
            ("type", "streamer"),
            ("insid", "675ba9d5b1796fc2539d3930"),
            ("projectid", "6821C61B48A925890040C3B3849B06C3"),
        ])
        .unwrap();

        assert_eq!(attrs.role, PeerRole::Streamer);
        assert_eq!(attrs.instance_id.as_deref(), Some("675ba9d5b1796fc2539d3930"));
        assert_eq!(attrs.project_id.as_deref(), Some("6821C61B48A925890040C3B3849B06C3"));
        assert_eq!(attrs.requested_id, None);
    }

    #[test]
    fn keeps_additional_attributes() {
        let attrs = ConnectionAttributes::from_pairs([
            ("type", "player"),
            ("custom", "value"),
            (" other ", "test"),
        ])
        .unwrap();

        assert_eq!(attrs.get("custom"), Some("value"));
        assert_eq!(attrs.get("other"), Some("test"));
    }

    #[test]
    fn type_is_case_insensitive_and_id_is_captured() {
        let attrs = ConnectionAttributes::from_pairs([("TYPE", "SFU"), ("id", "sfu-1")]).unwrap();
        assert_eq!(attrs.role, PeerRole::Sfu);
        assert_eq!(attrs.requested_id.as_deref(), Some("sfu-1"));
    }

    #[test]
    fn missing_or_invalid_type_is_rejected() {
        let err = ConnectionAttributes::from_pairs([("insid", "123")]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);

        let err = ConnectionAttributes::from_pairs([("type", "invalid")]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);

        let none: [(&str, &str); 0] = [];
        assert!(ConnectionAttributes::from_pairs(none).is_err());
    }
}
