/// Alternate tokens the permutation engine may substitute for canonical path
/// segments. Order matters: the engine shuffles `alternates + [token]`
/// deterministically per seed, so table order is part of the determinism
/// contract.
const BUILTIN: &[(&str, &[&str])] = &[
    ("auth", &["oauth", "login", "signin"]),
    ("me", &["self", "myself"]),
    (
        "users",
        &[
            "user", "users", "employee", "employees", "account", "accounts", "member", "members",
            "staff", "people",
        ],
    ),
    ("projects", &["task", "tasks", "subprojects", "subproject"]),
    (
        "organizations",
        &["organization", "institution", "company", "companies", "groups"],
    ),
    ("integrations", &["connection", "connections", "setup", "setups"]),
    ("last_activity", &["activity", "activities", "action", "actions", "last"]),
    ("members", &["staff_member", "staff_members", "persons", "users"]),
    ("links", &["integrations", "connectivity"]),
    (
        "activities",
        &["activity", "actions", "action", "operations", "operation", "work", "working"],
    ),
    (
        "last_activities",
        &["activity", "actions", "action", "operations", "operation", "work", "working"],
    ),
    ("applications", &["application", "app", "apps"]),
    ("urls", &["url", "link", "links"]),
    ("screenshots", &["shots", "screens", "images"]),
    ("notes", &["memos", "data"]),
    ("tasks", &["todos", "task"]),
    ("weekly", &["by_week", "week", "weeks", "seven_days"]),
    ("my", &["own", "me", "myself", "i"]),
    ("team", &["members", "team_members", "staff"]),
    ("custom", &["specific", "advanced"]),
    ("by_project", &["projects", "group_by_project", "project"]),
    ("by_member", &["members", "member", "group_by_member"]),
    ("by_date", &["date", "dates", "days", "day", "daily"]),
    ("time_edit_logs", &["time_logs", "edit_logs"]),
    ("team_payments", &["earnings", "money"]),
    ("update_metadata", &["metadata_update", "set_metadata"]),
    ("update_members", &["members_update", "set_members"]),
    ("invites", &["invitations"]),
];

/// Ordered canonical-token → alternates table.
///
/// Missing tokens are not an error: the engine falls back to "the token is
/// its own only synonym" and logs a warning.
#[derive(Debug, Clone)]
pub struct SynonymTable {
    entries: Vec<(String, Vec<String>)>,
}

impl SynonymTable {
    pub fn builtin() -> Self {
        Self {
            entries: BUILTIN
                .iter()
                .map(|(token, alts)| {
                    (
                        token.to_string(),
                        alts.iter().map(|s| s.to_string()).collect(),
                    )
                })
                .collect(),
        }
    }

    pub fn new(entries: Vec<(String, Vec<String>)>) -> Self {
        Self { entries }
    }

    pub fn get(&self, token: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(key, _)| key == token)
            .map(|(_, alts)| alts.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(key, alts)| (key.as_str(), alts.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for SynonymTable {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_contains_core_vocabulary() {
        let table = SynonymTable::builtin();
        assert!(table.get("users").is_some());
        assert!(table.get("projects").is_some());
        assert!(table.get("organizations").is_some());
        assert!(table.get("auth").is_some());
    }

    #[test]
    fn missing_token_returns_none() {
        let table = SynonymTable::builtin();
        assert!(table.get("timesheets").is_none());
    }

    #[test]
    fn iteration_order_is_stable() {
        let table = SynonymTable::builtin();
        let first: Vec<&str> = table.iter().take(3).map(|(k, _)| k).collect();
        assert_eq!(first, vec!["auth", "me", "users"]);
    }
}
