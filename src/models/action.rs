//! Mutating actions and the scripts attached to them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Actions that can trigger post-action scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionType {
    New,
    Renew,
    Remove,
    Package,
}

impl ActionType {
    pub const ALL: [ActionType; 4] = [
        ActionType::New,
        ActionType::Renew,
        ActionType::Remove,
        ActionType::Package,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::New => "new",
            ActionType::Renew => "renew",
            ActionType::Remove => "remove",
            ActionType::Package => "package",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shell snippets to run after a given action, keyed by action type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomScriptsMap(BTreeMap<ActionType, Vec<String>>);

impl CustomScriptsMap {
    /// Scripts for an action, empty when none are configured.
    pub fn get(&self, action: ActionType) -> &[String] {
        self.0.get(&action).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (ActionType, &[String])> {
        self.0.iter().map(|(action, scripts)| (*action, scripts.as_slice()))
    }

    pub fn insert(&mut self, action: ActionType, scripts: Vec<String>) {
        self.0.insert(action, scripts);
    }

    pub fn example() -> Self {
        let mut map = Self::default();
        for action in ActionType::ALL {
            map.insert(
                action,
                vec![format!("echo \"{} done for $OCM_USERS in profile $OCM_PROFILE\"", action)],
            );
        }
        map
    }
}
