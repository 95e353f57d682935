//! Label selector parser using nom.
//!
//! Accepts `{name="value", ...}` with optional braces. Only equality
//! matchers are supported; other Loki matchers are recognised so they can
//! be rejected with a useful message.

use crate::core::{GatewayError, LabelSet, Result};
use nom::{
    branch::alt,
    bytes::complete::{escaped_transform, is_not, tag, take_while},
    character::complete::{char, multispace0, satisfy},
    combinator::{map, opt, recognize, value},
    multi::separated_list1,
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

#[derive(Debug, PartialEq)]
struct Matcher<'a> {
    name: &'a str,
    op: &'a str,
    value: String,
}

/// Parse a selector string into a label set.
///
/// Duplicate names keep the last value. `{}` and the empty string both
/// yield the empty set.
pub fn parse_selector(input: &str) -> Result<LabelSet> {
    let trimmed = input.trim();

    let matchers = match selector(trimmed) {
        Ok((remaining, matchers)) => {
            if !remaining.trim().is_empty() {
                return Err(GatewayError::parse(format!(
                    "unexpected input after selector: '{}'",
                    remaining
                )));
            }
            matchers
        },
        Err(e) => {
            return Err(GatewayError::parse(format!(
                "failed to parse selector '{}': {}",
                input, e
            )))
        },
    };

    let mut labels = LabelSet::new();
    for matcher in matchers {
        if matcher.op != "=" {
            return Err(GatewayError::parse(format!(
                "unsupported matcher '{}' for label '{}', only '=' is supported",
                matcher.op, matcher.name
            )));
        }
        labels.insert(matcher.name, matcher.value);
    }
    Ok(labels)
}

/// Braced or bare matcher list
fn selector(input: &str) -> IResult<&str, Vec<Matcher<'_>>> {
    alt((
        delimited(
            char('{'),
            preceded(multispace0, matcher_list),
            preceded(multispace0, char('}')),
        ),
        matcher_list,
    ))(input)
}

/// Comma separated matchers, trailing comma allowed
fn matcher_list(input: &str) -> IResult<&str, Vec<Matcher<'_>>> {
    map(
        opt(terminated(
            separated_list1(delimited(multispace0, char(','), multispace0), matcher),
            opt(preceded(multispace0, char(','))),
        )),
        Option::unwrap_or_default,
    )(input)
}

fn matcher(input: &str) -> IResult<&str, Matcher<'_>> {
    map(
        tuple((
            label_name,
            preceded(multispace0, match_op),
            preceded(multispace0, quoted_value),
        )),
        |(name, op, value)| Matcher { name, op, value },
    )(input)
}

/// `[a-zA-Z_][a-zA-Z0-9_.]*`
fn label_name(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c| c.is_ascii_alphabetic() || c == '_'),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '.'),
    ))(input)
}

fn match_op(input: &str) -> IResult<&str, &str> {
    // Longest first so `=~` is not read as `=`
    alt((tag("=~"), tag("!~"), tag("!="), tag("=")))(input)
}

/// Double-quoted string with backslash escapes
fn quoted_value(input: &str) -> IResult<&str, String> {
    delimited(
        char('"'),
        map(
            opt(escaped_transform(
                is_not("\\\""),
                '\\',
                alt((
                    value("\\", tag("\\")),
                    value("\"", tag("\"")),
                    value("\n", tag("n")),
                    value("\t", tag("t")),
                    value("\r", tag("r")),
                )),
            )),
            Option::unwrap_or_default,
        ),
        char('"'),
    )(input)
}
