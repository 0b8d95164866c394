use serde::{Deserialize, Deserializer, Serialize};

/// One monitored stream, as held in the registry and written to the snapshot.
///
/// `live` is only changed through [`Channel::set_live`] and
/// [`Channel::set_offline`], which the transition detector calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    name: String,
    #[serde(default, deserialize_with = "null_as_offline")]
    live: bool,
}

fn null_as_offline<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

impl Channel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            live: false,
        }
    }

    pub fn with_live(name: impl Into<String>, live: bool) -> Self {
        Self {
            name: name.into(),
            live,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    /// Case-insensitive comparison against a remote or user-supplied name.
    pub fn matches(&self, name: &str) -> bool {
        names_match(&self.name, name)
    }

    pub fn set_live(&mut self) {
        self.live = true;
    }

    pub fn set_offline(&mut self) {
        self.live = false;
    }
}

/// Channel identity: trimmed, case-insensitive.
pub fn names_match(a: &str, b: &str) -> bool {
    let (a, b) = (a.trim(), b.trim());
    a.eq_ignore_ascii_case(b) || a.to_lowercase() == b.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_channel_starts_offline() {
        let c = Channel::new("alice");
        assert_eq!(c.name(), "alice");
        assert!(!c.is_live());
    }

    #[test]
    fn mutators_flip_live() {
        let mut c = Channel::new("alice");
        c.set_live();
        assert!(c.is_live());
        c.set_offline();
        assert!(!c.is_live());
    }

    #[test]
    fn matches_ignores_case_and_whitespace() {
        let c = Channel::new("Carol");
        assert!(c.matches("carol"));
        assert!(c.matches(" CAROL "));
        assert!(!c.matches("caroline"));
    }

    #[test]
    fn serializes_as_name_live_record() {
        let json = serde_json::to_value(Channel::with_live("bob", true)).unwrap();
        assert_eq!(json, serde_json::json!({ "name": "bob", "live": true }));
    }

    #[test]
    fn deserialize_ignores_unknown_fields() {
        let c: Channel =
            serde_json::from_str(r#"{"name":"dave","live":true,"game":"chess"}"#).unwrap();
        assert_eq!(c, Channel::with_live("dave", true));
    }

    #[test]
    fn null_or_missing_live_reads_as_offline() {
        let channels: Vec<Channel> = serde_json::from_str(
            r#"[{"name":"erin","live":null},{"name":"frank"},{"name":"gus","live":true}]"#,
        )
        .unwrap();
        assert_eq!(
            channels,
            vec![
                Channel::new("erin"),
                Channel::new("frank"),
                Channel::with_live("gus", true),
            ]
        );
    }
}
