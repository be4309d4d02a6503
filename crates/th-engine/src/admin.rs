//! Parsing of `/`-prefixed admin commands.
//!
//! Commands are only honoured for organization owners; the permission
//! gate lives in the daemon, this module only parses.

use th_core::types::TaskKey;

/// A fully parsed admin command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    /// `/new_user <login>`: create a progress record at the first task.
    NewUser { user: String },
    /// `/del_user <login>`: wipe a progress record.
    DelUser { user: String },
    /// `/del_repo <name>`: delete a per-participant repository.
    DelRepo { name: String },
    /// `/reset_repo <name>`: close every open issue in a repository.
    ResetRepo { name: String },
    /// `/create_repos <a,b,c>`: create one repository per login.
    CreateRepos { users: Vec<String> },
    /// `/new_hint <quest> <task> <text>`: record a hint for a task.
    NewHint { key: TaskKey, text: String },
}

impl AdminCommand {
    /// Parse a comment body into a command. Returns `None` for anything
    /// that is not a well-formed command, including a known verb with
    /// missing arguments.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        let rest = input.strip_prefix('/')?;
        let (verb, args) = match rest.split_once(char::is_whitespace) {
            Some((verb, args)) => (verb, args.trim()),
            None => (rest, ""),
        };

        match verb {
            "new_user" => single_token(args).map(|user| Self::NewUser { user }),
            "del_user" => single_token(args).map(|user| Self::DelUser { user }),
            "del_repo" => single_token(args).map(|name| Self::DelRepo { name }),
            "reset_repo" => single_token(args).map(|name| Self::ResetRepo { name }),
            "create_repos" => {
                let users: Vec<String> = args
                    .split(|c: char| c == ',' || c.is_whitespace())
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect();
                if users.is_empty() {
                    None
                } else {
                    Some(Self::CreateRepos { users })
                }
            }
            "new_hint" => {
                let mut parts = args.splitn(3, char::is_whitespace);
                let quest = parts.next().filter(|s| !s.is_empty())?;
                let task = parts.next().filter(|s| !s.is_empty())?;
                let text = parts.next().map(str::trim).filter(|s| !s.is_empty())?;
                Some(Self::NewHint {
                    key: TaskKey::new(quest, task),
                    text: text.to_string(),
                })
            }
            _ => None,
        }
    }
}

fn single_token(args: &str) -> Option<String> {
    let mut parts = args.split_whitespace();
    let token = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    Some(token.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
