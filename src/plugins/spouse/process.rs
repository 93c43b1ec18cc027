use std::fmt;

use tracing::debug;

use super::{
    data::{DrawOutcome, DrawRecord},
    EMPTY_LEADERBOARD, HELP, LIMIT_USAGE, NOT_ADMIN, NO_HISTORY,
};
use crate::{common::convec, error::DrawError, Spouse};

/// A chat message as handed over by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub user_id: String,
    pub group_id: Option<String>,
    pub content: String,
}

impl Event {
    pub fn new(
        user_id: impl Into<String>,
        group_id: Option<&str>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            group_id: group_id.map(String::from),
            content: content.into(),
        }
    }

    /// Console format: `<user> <group|-> <message>`.
    pub fn from_line(line: &str) -> Option<Self> {
        let mut parts = line.trim().splitn(3, char::is_whitespace);
        let user_id = parts.next().filter(|user| !user.is_empty())?;
        let group_id = match parts.next()? {
            "-" => None,
            group => Some(group),
        };
        let content = parts.next().unwrap_or_default().trim();
        Some(Self::new(user_id, group_id, content))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Draw { mention: bool },
    History,
    Leaderboard,
    Help,
    SetLimit(Option<u32>),
}

impl Command {
    pub fn parse(content: &str) -> Option<Self> {
        let (command, args) = convec(content)?;
        Some(match command {
            "今日老婆" | "抽取" | "抽老婆" | "wife" => Self::Draw { mention: true },
            "今日老婆-@" | "抽取-@" | "抽老婆-@" | "wife-@" => Self::Draw { mention: false },
            "今日记录" | "记录" | "record" => Self::History,
            "老婆榜" | "排行" | "rank" => Self::Leaderboard,
            "帮助" | "help" => Self::Help,
            "设置上限" | "setlimit" => {
                Self::SetLimit(args.first().and_then(|limit| limit.parse().ok()))
            }
            _ => return None,
        })
    }
}

/// What the host should render in response to a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Drawn {
        user_id: String,
        drawn: DrawRecord,
        mention: bool,
        count: u32,
        limit: u32,
        avatar_url: Option<String>,
    },
    History {
        user_id: String,
        records: Vec<DrawRecord>,
    },
    Leaderboard {
        group_id: String,
        entries: Vec<(String, u32)>,
    },
    LimitSet {
        group_id: String,
        limit: u32,
    },
    Help,
    Error(String),
}

impl From<DrawError> for Reply {
    fn from(e: DrawError) -> Self {
        Self::Error(e.user_message())
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Drawn {
                user_id,
                drawn,
                mention,
                count,
                limit,
                avatar_url,
            } => {
                write!(f, "@{user_id} 你的今日老婆是")?;
                if let Some(url) = avatar_url {
                    write!(f, " [图片]({url})")?;
                }
                if *mention {
                    write!(f, " @{}", drawn.user_id)?;
                } else {
                    write!(f, " {}", drawn.nickname)?;
                }
                write!(f, "\n今日已抽取 {count}/{limit} 次")
            }
            Self::History { records, .. } if records.is_empty() => f.write_str(NO_HISTORY),
            Self::History { user_id, records } => {
                write!(f, "@{user_id} 你今日抽到的老婆是：")?;
                for (n, record) in records.iter().enumerate() {
                    write!(f, "\n{}. {} (QQ: {})", n + 1, record.nickname, record.user_id)?;
                }
                Ok(())
            }
            Self::Leaderboard { entries, .. } if entries.is_empty() => {
                f.write_str(EMPTY_LEADERBOARD)
            }
            Self::Leaderboard { entries, .. } => {
                f.write_str("今日老婆榜：")?;
                for (n, (user_id, count)) in entries.iter().enumerate() {
                    write!(f, "\n{}. {user_id} - {count}次", n + 1)?;
                }
                Ok(())
            }
            Self::LimitSet { limit, .. } => write!(f, "本群每日抽取上限已设置为 {limit} 次"),
            Self::Help => f.write_str(HELP),
            Self::Error(message) => f.write_str(message),
        }
    }
}

// plugin main: returns None when the message is not one of our commands
pub async fn on_message(spouse: &Spouse, event: &Event) -> Option<Reply> {
    let command = Command::parse(&event.content)?;
    debug!(user = %event.user_id, ?command, "command received");

    Some(match command {
        Command::Draw { mention } => draw(spouse, event, mention)
            .await
            .unwrap_or_else(Reply::from),
        Command::History => Reply::History {
            user_id: event.user_id.clone(),
            records: spouse.ledger.history(&event.user_id).await,
        },
        Command::Leaderboard => match event.group_id.as_deref() {
            Some(group_id) => Reply::Leaderboard {
                group_id: group_id.to_string(),
                entries: spouse
                    .ledger
                    .leaderboard(group_id, spouse.leaderboard_size)
                    .await,
            },
            None => DrawError::GroupIdUnavailable.into(),
        },
        Command::Help => Reply::Help,
        Command::SetLimit(limit) => set_limit(spouse, event, limit).await,
    })
}

async fn draw(spouse: &Spouse, event: &Event, mention: bool) -> Result<Reply, DrawError> {
    let group_id = event
        .group_id
        .as_deref()
        .ok_or(DrawError::GroupIdUnavailable)?;

    // skip the member list call for users who are already out of draws
    spouse.ledger.check_quota(&event.user_id, group_id).await?;

    let members = spouse
        .roster
        .members_from(group_id, &*spouse.source)
        .await?;
    if members.is_empty() {
        return Err(DrawError::NoCandidates);
    }

    let DrawOutcome {
        record,
        count,
        limit,
    } = spouse
        .ledger
        .try_draw(&event.user_id, group_id, &members)
        .await?;

    Ok(Reply::Drawn {
        user_id: event.user_id.clone(),
        avatar_url: spouse.source.avatar_url(&record.user_id),
        drawn: record,
        mention,
        count,
        limit,
    })
}

async fn set_limit(spouse: &Spouse, event: &Event, limit: Option<u32>) -> Reply {
    let Some(group_id) = event.group_id.as_deref() else {
        return DrawError::GroupIdUnavailable.into();
    };
    if !spouse.is_admin(&event.user_id) {
        return Reply::Error(NOT_ADMIN.to_string());
    }
    let Some(limit) = limit else {
        return Reply::Error(LIMIT_USAGE.to_string());
    };

    spouse.ledger.set_limit(group_id, limit).await;
    Reply::LimitSet {
        group_id: group_id.to_string(),
        limit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_aliases() {
        for alias in ["/今日老婆", "抽取", "/抽老婆", "wife"] {
            assert_eq!(Command::parse(alias), Some(Command::Draw { mention: true }));
        }
        for alias in ["/今日老婆-@", "抽取-@", "抽老婆-@", "/wife-@"] {
            assert_eq!(Command::parse(alias), Some(Command::Draw { mention: false }));
        }
        assert_eq!(Command::parse("/今日记录"), Some(Command::History));
        assert_eq!(Command::parse("记录"), Some(Command::History));
        assert_eq!(Command::parse("/老婆榜"), Some(Command::Leaderboard));
        assert_eq!(Command::parse("help"), Some(Command::Help));
        assert_eq!(Command::parse("/帮助"), Some(Command::Help));
        assert_eq!(Command::parse("hello there"), None);
        assert_eq!(Command::parse(""), None);
    }

    #[test]
    fn test_help_lists_every_command() {
        let help = Reply::Help.to_string();
        for alias in [
            "/今日老婆", "抽取", "抽老婆", "wife", "wife-@", "/今日记录", "record", "/老婆榜",
            "排行", "rank", "/设置上限", "setlimit", "/帮助", "help",
        ] {
            assert!(help.contains(alias.trim_start_matches('/')), "help is missing {alias}");
            assert!(Command::parse(alias).is_some(), "{alias} is not a command");
        }
    }

    #[test]
    fn test_set_limit_argument() {
        assert_eq!(Command::parse("/设置上限 5"), Some(Command::SetLimit(Some(5))));
        assert_eq!(Command::parse("setlimit 0"), Some(Command::SetLimit(Some(0))));
        assert_eq!(Command::parse("setlimit -1"), Some(Command::SetLimit(None)));
        assert_eq!(Command::parse("设置上限"), Some(Command::SetLimit(None)));
    }

    #[test]
    fn test_event_from_line() {
        assert_eq!(
            Event::from_line("42 100 /今日老婆"),
            Some(Event::new("42", Some("100"), "/今日老婆"))
        );
        assert_eq!(
            Event::from_line("42 - /今日记录"),
            Some(Event::new("42", None, "/今日记录"))
        );
        assert_eq!(Event::from_line("42 100"), Some(Event::new("42", Some("100"), "")));
        assert_eq!(Event::from_line("42"), None);
        assert_eq!(Event::from_line(""), None);
    }

    #[test]
    fn test_render_draw() {
        let drawn = DrawRecord {
            user_id: "7".into(),
            nickname: "Seven".into(),
        };
        let with_mention = Reply::Drawn {
            user_id: "1".into(),
            drawn: drawn.clone(),
            mention: true,
            count: 1,
            limit: 3,
            avatar_url: None,
        };
        assert_eq!(with_mention.to_string(), "@1 你的今日老婆是 @7\n今日已抽取 1/3 次");

        let without_mention = Reply::Drawn {
            user_id: "1".into(),
            drawn,
            mention: false,
            count: 2,
            limit: 3,
            avatar_url: Some("http://a/7".into()),
        };
        assert_eq!(
            without_mention.to_string(),
            "@1 你的今日老婆是 [图片](http://a/7) Seven\n今日已抽取 2/3 次"
        );
    }

    #[test]
    fn test_render_lists() {
        let empty = Reply::History {
            user_id: "1".into(),
            records: vec![],
        };
        assert_eq!(empty.to_string(), NO_HISTORY);

        let board = Reply::Leaderboard {
            group_id: "g".into(),
            entries: vec![("7".into(), 2), ("8".into(), 1)],
        };
        assert_eq!(board.to_string(), "今日老婆榜：\n1. 7 - 2次\n2. 8 - 1次");

        let quota: Reply = DrawError::QuotaExceeded { limit: 3 }.into();
        assert_eq!(quota.to_string(), "今日抽取已达上限(3次)");
    }
}
