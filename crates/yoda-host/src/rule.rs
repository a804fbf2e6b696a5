//! Host rule invocation
//!
//! Rule arguments are either short plain strings, inline literals that
//! went through [`escape_rule_literal`], or payloads handed to the host
//! through a side channel. Inline literals survive being embedded between
//! single quotes in a rule command line.

use crate::error::{HostError, HostResult};
use std::fmt;
use yoda_common::{BucketCase, RevisionsInfo};

/// Rule applying the retention policy to a chunk of revisions-info entries
pub const REVISIONS_CLEAN_UP: &str = "rule_revisions_clean_up";

/// A single rule argument
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RuleArg {
    /// Short value without quotes or backslashes
    Str(String),
    /// Value escaped with [`escape_rule_literal`]
    Escaped(String),
    /// Value passed verbatim through the host's side channel
    Payload(String),
}

impl RuleArg {
    /// Value as the rule sees it
    pub fn decode(&self) -> HostResult<String> {
        match self {
            Self::Str(s) | Self::Payload(s) => Ok(s.clone()),
            Self::Escaped(s) => unescape_rule_literal(s),
        }
    }

    #[must_use]
    pub const fn is_payload(&self) -> bool {
        matches!(self, Self::Payload(_))
    }
}

/// A rule name with its arguments
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuleCall {
    pub name: String,
    pub args: Vec<RuleArg>,
}

impl RuleCall {
    pub fn new(name: impl Into<String>, args: Vec<RuleArg>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

impl fmt::Display for RuleCall {
    /// Renders the inline command line form; payloads are summarised
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match arg {
                RuleArg::Str(s) | RuleArg::Escaped(s) => write!(f, "'{s}'")?,
                RuleArg::Payload(s) => write!(f, "<payload {} bytes>", s.len())?,
            }
        }
        f.write_str(")")
    }
}

/// Escape a value for inclusion between single quotes in a rule call.
///
/// Each backslash becomes four backslashes, then each single quote becomes
/// a backslash-quote pair.
#[must_use]
pub fn escape_rule_literal(value: &str) -> String {
    value.replace('\\', "\\\\\\\\").replace('\'', "\\'")
}

/// Inverse of [`escape_rule_literal`]
pub fn unescape_rule_literal(escaped: &str) -> HostResult<String> {
    let mut out = String::with_capacity(escaped.len());
    let mut rest = escaped;
    while let Some(idx) = rest.find('\\') {
        out.push_str(&rest[..idx]);
        let tail = &rest[idx..];
        if let Some(after) = tail.strip_prefix("\\'") {
            out.push('\'');
            rest = after;
        } else if let Some(after) = tail.strip_prefix("\\\\\\\\") {
            out.push('\\');
            rest = after;
        } else {
            return Err(HostError::Payload(format!(
                "dangling escape at byte {}",
                escaped.len() - tail.len()
            )));
        }
    }
    if rest.contains('\'') {
        return Err(HostError::Payload("unescaped single quote".into()));
    }
    out.push_str(rest);
    Ok(out)
}

/// Decoded arguments of [`REVISIONS_CLEAN_UP`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CleanupRequest {
    pub chunk: Vec<RevisionsInfo>,
    pub bucket_case: BucketCase,
    pub end_of_calendar_day: i64,
    pub verbose: bool,
}

impl CleanupRequest {
    /// Build the rule call; the chunk goes through the side channel when
    /// `use_payload` is set and inline otherwise
    pub fn to_call(&self, use_payload: bool) -> HostResult<RuleCall> {
        let chunk_json =
            serde_json::to_string(&self.chunk).map_err(|e| HostError::Payload(e.to_string()))?;
        let chunk_arg = if use_payload {
            RuleArg::Payload(chunk_json)
        } else {
            RuleArg::Escaped(escape_rule_literal(&chunk_json))
        };
        Ok(RuleCall::new(
            REVISIONS_CLEAN_UP,
            vec![
                chunk_arg,
                RuleArg::Str(self.bucket_case.to_string()),
                RuleArg::Str(self.end_of_calendar_day.to_string()),
                RuleArg::Str(if self.verbose { "1" } else { "0" }.to_string()),
            ],
        ))
    }

    /// Decode a rule call built by [`CleanupRequest::to_call`]
    pub fn from_call(call: &RuleCall) -> HostResult<Self> {
        if call.name != REVISIONS_CLEAN_UP {
            return Err(HostError::Payload(format!("unexpected rule {}", call.name)));
        }
        let [chunk, bucket_case, end_of_day, verbose] = call.args.as_slice() else {
            return Err(HostError::Payload(format!(
                "{REVISIONS_CLEAN_UP} takes 4 arguments, got {}",
                call.args.len()
            )));
        };
        let chunk = serde_json::from_str(&chunk.decode()?)
            .map_err(|e| HostError::Payload(format!("chunk: {e}")))?;
        let bucket_case = bucket_case.decode()?.parse().map_err(HostError::Payload)?;
        let end_of_calendar_day = end_of_day
            .decode()?
            .parse()
            .map_err(|e| HostError::Payload(format!("end of calendar day: {e}")))?;
        let verbose = verbose.decode()? == "1";
        Ok(Self {
            chunk,
            bucket_case,
            end_of_calendar_day,
            verbose,
        })
    }
}
