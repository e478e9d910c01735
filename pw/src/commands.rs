//! Chat command parsing
//!
//! Turns message text into a [`Command`]. Item ids are bech32-decoded here
//! so the handlers only ever see checksummed mainnet addresses.

use thiserror::Error;
use tracing::debug;

use crate::balance::ItemKind;

pub const HELP_TEXT: &str = "Available commands:\n\
`/help` : *this help message*\n\
`/pool_add <poolID>` : *Add a pool*\n\
`/pool_remove <poolID>` : *Remove a pool*\n\
`/pool_list` : *List your pools*\n\
`/delegation_add <delegationID>` : *Add a delegation*\n\
`/delegation_remove <delegationID>` : *Remove a delegation*\n\
`/delegation_list` : *List your delegations*\n\
`/balance` : *Get the total balance of your pools and delegations*\n\
`/notify_start` : *Notify on balance change*\n\
`/notify_stop` : *Stop balance change notifications*\n\
`/notify_status` : *Check if you're subscribed to balance change notifications*";

/// A recognised chat command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Add(ItemKind, String),
    Remove(ItemKind, String),
    List(ItemKind),
    Balance,
    NotifyStart,
    NotifyStop,
    NotifyStatus,
}

/// Why a message could not be turned into a command
///
/// The display text is the reply sent back to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Not a command")]
    NotACommand,

    #[error("Unknown command: {0}. Send /help for the list of commands")]
    Unknown(String),

    #[error("Usage: `{usage}`")]
    MissingArgument { usage: &'static str },

    #[error("Invalid {} ID", .0.name())]
    InvalidId(ItemKind),
}

impl ParseError {
    /// Messages that are not commands are ignored rather than answered
    pub fn is_silent(&self) -> bool {
        matches!(self, ParseError::NotACommand)
    }
}

/// Parse message text into a command
///
/// Accepts the `/cmd@botname` form used in group chats. Extra arguments are
/// ignored.
pub fn parse(text: &str) -> Result<Command, ParseError> {
    let mut words = text.split_whitespace();
    let Some(head) = words.next().filter(|w| w.starts_with('/')) else {
        return Err(ParseError::NotACommand);
    };
    let name = head.split('@').next().unwrap_or(head);
    let arg = words.next();

    let command = match name {
        "/help" | "/hello" | "/start" => Command::Help,
        "/pool_add" => Command::Add(ItemKind::Pool, item_arg(ItemKind::Pool, arg, "/pool_add <poolID>")?),
        "/pool_remove" => Command::Remove(ItemKind::Pool, item_arg(ItemKind::Pool, arg, "/pool_remove <poolID>")?),
        "/pool_list" => Command::List(ItemKind::Pool),
        "/delegation_add" => Command::Add(
            ItemKind::Delegation,
            item_arg(ItemKind::Delegation, arg, "/delegation_add <delegationID>")?,
        ),
        "/delegation_remove" => Command::Remove(
            ItemKind::Delegation,
            item_arg(ItemKind::Delegation, arg, "/delegation_remove <delegationID>")?,
        ),
        "/delegation_list" => Command::List(ItemKind::Delegation),
        "/balance" => Command::Balance,
        "/notify_start" => Command::NotifyStart,
        "/notify_stop" => Command::NotifyStop,
        "/notify_status" => Command::NotifyStatus,
        other => return Err(ParseError::Unknown(other.to_string())),
    };
    Ok(command)
}

fn item_arg(kind: ItemKind, arg: Option<&str>, usage: &'static str) -> Result<String, ParseError> {
    let id = arg.ok_or(ParseError::MissingArgument { usage })?;
    if !validate_address(kind, id) {
        return Err(ParseError::InvalidId(kind));
    }
    // Bech32 is case-insensitive; lowercase is the form the indexer serves
    Ok(id.to_lowercase())
}

/// Human-readable prefix of addresses of `kind`
pub fn address_prefix(kind: ItemKind) -> &'static str {
    match kind {
        ItemKind::Pool => "mpool",
        ItemKind::Delegation => "mdelg",
    }
}

/// Whether `id` is a valid mainnet address of `kind`
///
/// The id must decode as bech32 or bech32m with a good checksum, and its
/// human-readable part must be the mainnet prefix for `kind`. A mistyped
/// id is rejected here instead of reading as a zero balance later.
pub fn validate_address(kind: ItemKind, id: &str) -> bool {
    match bech32::decode(id) {
        Ok((hrp, _data)) => {
            let matches = hrp.as_str().eq_ignore_ascii_case(address_prefix(kind));
            debug!(%kind, hrp = %hrp.as_str(), matches, "validate_address: decoded");
            matches
        }
        Err(e) => {
            debug!(%kind, error = %e, "validate_address: not bech32");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POOL: &str = "mpool18j3ngukhl0sh5qff8zfn9es9lwsxhjuqk2mvqfaw9k2e86jgncxq79x5x2";
    const DELEGATION: &str = "mdelg1m4nedzgyzpxw474cv6zl3mh7mcgefgh2xtsgfe6am86jpz8lh5cszva739";
    const TESTNET_POOL: &str = "tpool1v0fy4es89uqww2n90c73dzdkfup2p769wtey89pt64g5t8xjcaxqupqr9w";

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(parse("/help"), Ok(Command::Help));
        assert_eq!(parse("/hello"), Ok(Command::Help));
        assert_eq!(parse("/pool_list"), Ok(Command::List(ItemKind::Pool)));
        assert_eq!(parse("/delegation_list"), Ok(Command::List(ItemKind::Delegation)));
        assert_eq!(parse("/balance"), Ok(Command::Balance));
        assert_eq!(parse("/notify_start"), Ok(Command::NotifyStart));
        assert_eq!(parse("/notify_stop"), Ok(Command::NotifyStop));
        assert_eq!(parse("  /notify_status  "), Ok(Command::NotifyStatus));
    }

    #[test]
    fn test_parse_bot_suffix() {
        assert_eq!(parse("/balance@pool_watch_bot"), Ok(Command::Balance));
    }

    #[test]
    fn test_parse_item_commands() {
        assert_eq!(
            parse(&format!("/pool_add {POOL}")),
            Ok(Command::Add(ItemKind::Pool, POOL.to_string()))
        );
        assert_eq!(
            parse(&format!("/delegation_remove {DELEGATION} extra")),
            Ok(Command::Remove(ItemKind::Delegation, DELEGATION.to_string()))
        );
    }

    #[test]
    fn test_parse_missing_argument_reports_usage() {
        let err = parse("/pool_add").unwrap_err();
        assert_eq!(err.to_string(), "Usage: `/pool_add <poolID>`");
    }

    #[test]
    fn test_parse_rejects_wrong_kind() {
        let err = parse(&format!("/pool_add {DELEGATION}")).unwrap_err();
        assert_eq!(err, ParseError::InvalidId(ItemKind::Pool));
        assert_eq!(err.to_string(), "Invalid pool ID");
    }

    #[test]
    fn test_parse_non_commands() {
        assert!(parse("hello there").unwrap_err().is_silent());
        assert!(parse("").unwrap_err().is_silent());
        let err = parse("/frobnicate").unwrap_err();
        assert!(!err.is_silent());
        assert_eq!(err, ParseError::Unknown("/frobnicate".to_string()));
    }

    #[test]
    fn test_validate_address() {
        assert!(validate_address(ItemKind::Pool, POOL));
        assert!(validate_address(ItemKind::Delegation, DELEGATION));
        assert!(!validate_address(ItemKind::Pool, DELEGATION));
        assert!(!validate_address(ItemKind::Delegation, POOL));
        assert!(!validate_address(ItemKind::Pool, "mpool1"));
        // 'b' and 'i' are outside the bech32 alphabet
        assert!(!validate_address(ItemKind::Pool, "mpool1qqqqqqbi"));
        assert!(!validate_address(ItemKind::Delegation, "mdelg2qqqqqqqq"));
    }

    #[test]
    fn test_validate_address_checks_checksum() {
        let typo = format!("{}q", &POOL[..POOL.len() - 1]);
        assert!(!validate_address(ItemKind::Pool, &typo));

        let swapped = POOL.replacen("8j3n", "8jn3", 1);
        assert!(!validate_address(ItemKind::Pool, &swapped));
    }

    #[test]
    fn test_validate_address_rejects_testnet() {
        assert!(!validate_address(ItemKind::Pool, TESTNET_POOL));
        assert_eq!(
            parse(&format!("/pool_add {TESTNET_POOL}")),
            Err(ParseError::InvalidId(ItemKind::Pool))
        );
    }
}
