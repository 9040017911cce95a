use std::str::FromStr;
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while, take_while1},
    character::complete::{char, multispace0},
    combinator::{map, map_res, opt, peek},
    multi::many1,
    sequence::{delimited, preceded, terminated},
};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{AttributeId, Value};
use crate::query::ast::{AssertionFilter, ExtensibleFilter, Filter, PresenceFilter, SubstringFilter};

/// Parses an RFC 4515 filter string. A bare item without the outer
/// parentheses (`cn=foo`) is accepted as well.
/// Examples:
/// - "(cn=John*)" -> substring
/// - "(&(objectClass=person)(uidNumber>=1000))" -> AND
/// - "(!(mail=*))" -> NOT presence
/// - "(cn:caseExactMatch:=Bob)" -> extensible
pub fn parse_filter(input: &str) -> Result<Filter> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Error::new(ErrorKind::Parse, "Empty filter".to_string()));
    }
    let wrapped;
    let source = if trimmed.starts_with('(') {
        trimmed
    } else {
        wrapped = format!("({})", trimmed);
        wrapped.as_str()
    };

    match terminated(filter, multispace0).parse(source) {
        Ok(("", parsed)) => Ok(parsed),
        Ok((rest, _)) => Err(Error::new(
            ErrorKind::Parse,
            format!("Unexpected trailing input '{}' in filter '{}'", rest, input),
        )),
        Err(e) => Err(Error::new(
            ErrorKind::Parse,
            format!("Invalid filter '{}': {}", input, e),
        )),
    }
}

impl FromStr for Filter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_filter(s)
    }
}

fn filter(input: &str) -> IResult<&str, Filter> {
    delimited(
        preceded(multispace0, char('(')),
        preceded(multispace0, filter_comp),
        preceded(multispace0, char(')')),
    )
    .parse(input)
}

fn filter_comp(input: &str) -> IResult<&str, Filter> {
    alt((
        map(preceded(char('&'), many1(filter)), Filter::and),
        map(preceded(char('|'), many1(filter)), Filter::or),
        map(preceded(char('!'), filter), Filter::not),
        extensible,
        item,
    ))
    .parse(input)
}

fn attribute_description(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == ';').parse(input)
}

fn raw_value(input: &str) -> IResult<&str, &str> {
    take_while(|c: char| c != '(' && c != ')').parse(input)
}

fn item(input: &str) -> IResult<&str, Filter> {
    map_res(
        (
            attribute_description,
            alt((tag("~="), tag(">="), tag("<="), tag("="))),
            raw_value,
        ),
        |(attribute, op, raw)| simple_item(attribute, op, raw),
    )
    .parse(input)
}

fn simple_item(attribute: &str, op: &str, raw: &str) -> Result<Filter> {
    let attribute = AttributeId::new(attribute);
    let assertion = |raw: &str| -> Result<AssertionFilter> {
        Ok(AssertionFilter {
            attribute: attribute.clone(),
            value: unescape(raw)?,
            count: None,
        })
    };

    match op {
        "~=" => Ok(Filter::Approximate(assertion(raw)?)),
        ">=" => Ok(Filter::GreaterEq(assertion(raw)?)),
        "<=" => Ok(Filter::LessEq(assertion(raw)?)),
        _ if raw == "*" => Ok(Filter::Presence(PresenceFilter {
            attribute,
            count: None,
        })),
        _ if raw.contains('*') => {
            let parts: Vec<&str> = raw.split('*').collect();
            let text = |s: &str| -> Result<Option<String>> {
                if s.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(unescape(s)?.to_string()))
                }
            };
            let initial = text(parts[0])?;
            let terminal = text(parts[parts.len() - 1])?;
            let mut any = Vec::new();
            for part in &parts[1..parts.len() - 1] {
                if let Some(part) = text(part)? {
                    any.push(part);
                }
            }
            Ok(Filter::Substring(SubstringFilter {
                attribute,
                initial,
                any,
                terminal,
                count: None,
            }))
        }
        _ => Ok(Filter::Equality(assertion(raw)?)),
    }
}

fn matching_rule(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '-' || c == '.').parse(input)
}

fn extensible(input: &str) -> IResult<&str, Filter> {
    map_res(
        (
            opt(attribute_description),
            opt(terminated(tag_no_case(":dn"), peek(char(':')))),
            opt(preceded(char(':'), matching_rule)),
            tag(":="),
            raw_value,
        ),
        |(attribute, dn, rule, _, raw)| -> Result<Filter> {
            if attribute.is_none() && rule.is_none() {
                return Err(Error::new(
                    ErrorKind::Parse,
                    "Extensible match needs an attribute or a rule".to_string(),
                ));
            }
            Ok(Filter::Extensible(ExtensibleFilter {
                attribute: attribute.map(AttributeId::new),
                rule: rule.map(str::to_string),
                value: unescape(raw)?,
                dn_attributes: dn.is_some(),
                count: None,
            }))
        },
    )
    .parse(input)
}

/// Resolves `\XX` escapes. Values that are not valid UTF-8 afterwards are binary.
fn unescape(raw: &str) -> Result<Value> {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            let hex = raw
                .get(i + 1..i + 3)
                .filter(|hex| hex.bytes().all(|b| b.is_ascii_hexdigit()))
                .ok_or_else(|| bad_escape(raw))?;
            out.push(u8::from_str_radix(hex, 16).map_err(|_| bad_escape(raw))?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    Ok(match String::from_utf8(out) {
        Ok(text) => Value::Text(text),
        Err(e) => Value::Binary(e.into_bytes()),
    })
}

fn bad_escape(raw: &str) -> Error {
    Error::new(ErrorKind::Parse, format!("Invalid escape sequence in '{}'", raw))
}
