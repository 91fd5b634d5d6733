//! POSIX shell quoting.
//!
//! Command lines are built from argument tokens with [`join`], each token
//! escaped by [`escape`]. [`split`] reverses the process, so
//! `join(&split(&join(args))?) == join(args)`.

use std::borrow::Cow;

use nom::{
    branch::alt,
    bytes::complete::{is_not, take_while1},
    character::complete::{anychar, char, multispace0, multispace1},
    combinator::{all_consuming, consumed, map, opt},
    multi::{fold_many0, many1, separated_list0},
    sequence::{delimited, preceded},
    IResult, Offset,
};

use crate::error::{OscError, OscResult};

fn is_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ',' | ':' | '/' | '@' | '%' | '+' | '=')
}

/// Quote `token` so a POSIX shell reads it back as one word.
///
/// Tokens made only of safe characters are returned unchanged; anything
/// else is single-quoted with embedded quotes written as `'\''`.
pub fn escape(token: &str) -> Cow<'_, str> {
    if token.is_empty() {
        return Cow::Borrowed("''");
    }
    if token.chars().all(is_safe) {
        return Cow::Borrowed(token);
    }
    Cow::Owned(format!("'{}'", token.replace('\'', r"'\''")))
}

/// Escape every token and join with single spaces.
pub fn join<S: AsRef<str>>(tokens: &[S]) -> String {
    tokens
        .iter()
        .map(|t| escape(t.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// `'...'`: everything literal up to the closing quote.
fn single_quoted(input: &str) -> IResult<&str, String> {
    map(
        delimited(char('\''), opt(is_not("'")), char('\'')),
        |s: Option<&str>| s.unwrap_or_default().to_string(),
    )(input)
}

/// `"..."`: backslash escapes only `$`, `` ` ``, `"`, `\` and newline.
fn double_quoted(input: &str) -> IResult<&str, String> {
    let chunk = alt((
        map(preceded(char('\\'), anychar), |c| match c {
            '$' | '`' | '"' | '\\' => c.to_string(),
            '\n' => String::new(),
            other => format!("\\{}", other),
        }),
        map(is_not("\"\\"), str::to_string),
    ));
    delimited(
        char('"'),
        fold_many0(chunk, String::new, |mut acc, part| {
            acc.push_str(&part);
            acc
        }),
        char('"'),
    )(input)
}

/// Unquoted `\x` yields `x`.
fn escaped_char(input: &str) -> IResult<&str, String> {
    map(preceded(char('\\'), anychar), |c| c.to_string())(input)
}

fn bare(input: &str) -> IResult<&str, String> {
    map(
        take_while1(|c: char| !c.is_whitespace() && !matches!(c, '\'' | '"' | '\\')),
        str::to_string,
    )(input)
}

/// One shell word: adjacent quoted and bare pieces concatenate.
fn word(input: &str) -> IResult<&str, String> {
    map(
        many1(alt((single_quoted, double_quoted, escaped_char, bare))),
        |parts| parts.concat(),
    )(input)
}

/// A word of a command line together with where it was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word<'a> {
    /// The word after quote removal.
    pub value: String,
    /// The word as written, quotes included.
    pub raw: &'a str,
    /// Byte offset of `raw` in the line.
    pub start: usize,
}

impl Word<'_> {
    pub fn end(&self) -> usize {
        self.start + self.raw.len()
    }
}

/// Split a command line into words the way a POSIX shell would,
/// without expansions.
pub fn split(line: &str) -> OscResult<Vec<String>> {
    Ok(split_words(line)?.into_iter().map(|w| w.value).collect())
}

/// Like [`split`], keeping each word's source text and position.
pub fn split_words(line: &str) -> OscResult<Vec<Word<'_>>> {
    all_consuming(delimited(
        multispace0,
        separated_list0(multispace1, consumed(word)),
        multispace0,
    ))(line)
    .map(|(_, words)| {
        words
            .into_iter()
            .map(|(raw, value)| Word {
                value,
                raw,
                start: line.offset(raw),
            })
            .collect()
    })
    .map_err(|_| OscError::Shell(format!("unbalanced quoting in: {}", line)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_escape_safe_tokens_unchanged() {
        assert_eq!(escape("pt-online-schema-change"), "pt-online-schema-change");
        assert_eq!(escape("D=app,t=users"), "D=app,t=users");
        assert_eq!(escape("--dry-run"), "--dry-run");
        assert_eq!(escape("/etc/my.cnf"), "/etc/my.cnf");
    }

    #[test]
    fn test_escape_quotes_unsafe_tokens() {
        assert_eq!(escape(""), "''");
        assert_eq!(escape("ADD `x` INT"), "'ADD `x` INT'");
        assert_eq!(escape("it's"), r"'it'\''s'");
        assert_eq!(escape("$(rm -rf /)"), "'$(rm -rf /)'");
    }

    #[test]
    fn test_split_quoting_rules() {
        assert_eq!(
            split(r#"a 'b c' "d \"e\"" f\ g"#).unwrap(),
            vec!["a", "b c", "d \"e\"", "f g"]
        );
        assert_eq!(split("  --x   y  ").unwrap(), vec!["--x", "y"]);
        assert_eq!(split("''").unwrap(), vec![""]);
        assert!(split("").unwrap().is_empty());
        assert_eq!(split("%&$^*(!(#)CD&`+").unwrap(), vec!["%&$^*(!(#)CD&`+"]);
    }

    #[test]
    fn test_split_rejects_unbalanced_quotes() {
        assert!(matches!(split("a 'b"), Err(OscError::Shell(_))));
        assert!(split("a \"b").is_err());
    }

    #[test]
    fn test_split_words_keeps_source_spans() {
        let line = r#"tool  --alter "ADD x int" a\;b"#;
        let words = split_words(line).unwrap();
        let raw: Vec<&str> = words.iter().map(|w| w.raw).collect();
        assert_eq!(raw, vec!["tool", "--alter", "\"ADD x int\"", "a\\;b"]);
        assert_eq!(words[2].value, "ADD x int");
        assert_eq!(words[3].value, "a;b");
        for w in &words {
            assert_eq!(&line[w.start..w.end()], w.raw);
        }
    }

    #[test]
    fn test_join_split_round_trip() {
        let args = vec![
            "pt-online-schema-change",
            "--alter",
            "ADD `foobar` varchar(255) DEFAULT '0' NOT NULL",
            "D=app,t=users",
            "--password",
            "who uses spaces in passwords?",
            "",
        ];
        let line = join(&args);
        let words = split(&line).unwrap();
        assert_eq!(words, args);
        assert_eq!(join(&words), line);
    }
}
