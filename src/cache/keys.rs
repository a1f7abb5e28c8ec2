//! Cache key scheme.
//!
//! Every key lives under one prefix so several engines can share a store:
//!
//! - `{prefix}:global` is the root every other entry hangs off.
//! - `{prefix}:{area}:{controller}:config` holds a group's partial configuration.
//! - `{prefix}:{area}:{controller}:{path}` holds a compiled template or a missing marker.
//! - `{prefix}:{area}:{controller}:config{uuid}` holds a partial poller.

use uuid::Uuid;

use crate::domain::group::GroupKey;

const GLOBAL: &str = "global";
const CONFIG: &str = "config";

/// Derives cache keys for one engine instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
}

impl KeySpace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// A key space with a fresh random prefix.
    pub fn random() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn global(&self) -> String {
        format!("{}:{GLOBAL}", self.prefix)
    }

    pub fn config(&self, group: &GroupKey) -> String {
        self.path(group, CONFIG)
    }

    pub fn path(&self, group: &GroupKey, path: &str) -> String {
        format!("{}:{group}:{path}", self.prefix)
    }

    /// A unique sibling key for a poller guarding `config_key`.
    pub fn poller(config_key: &str) -> String {
        format!("{config_key}{}", Uuid::new_v4().simple())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_follow_the_scheme() {
        let keys = KeySpace::new(".hbsVE");
        let home = GroupKey::controller_only("Home").unwrap();
        let admin = GroupKey::new("Admin", "Home").unwrap();

        assert_eq!(keys.global(), ".hbsVE:global");
        assert_eq!(keys.config(&home), ".hbsVE::Home:config");
        assert_eq!(keys.config(&admin), ".hbsVE:Admin:Home:config");
        assert_eq!(
            keys.path(&home, "~/Views/Home/Index.hbs"),
            ".hbsVE::Home:~/Views/Home/Index.hbs"
        );
    }

    #[test]
    fn poller_keys_are_unique_siblings() {
        let config = KeySpace::new("p").config(&GroupKey::controller_only("Home").unwrap());
        let first = KeySpace::poller(&config);
        let second = KeySpace::poller(&config);

        assert!(first.starts_with(&config));
        assert_ne!(first, second);
    }

    #[test]
    fn random_prefixes_differ() {
        assert_ne!(KeySpace::random().prefix(), KeySpace::random().prefix());
    }
}
