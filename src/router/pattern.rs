//! Route pattern compilation.
//!
//! [`compile`] turns a route pattern into a [`Matcher`]: an anchored,
//! case-insensitive regular expression plus the ordered list of parameter
//! [`Key`]s its capture groups correspond to.
//!
//! | Pattern            | Matches                 | Parameters                    |
//! |--------------------|-------------------------|-------------------------------|
//! | `/users/:id`       | `/users/42`             | `id → "42"`                   |
//! | `/users/:id?`      | `/users`, `/users/42`   | `id` only when present        |
//! | `/files/:path+`    | `/files/a/b`            | `path → ["a", "b"]`           |
//! | `/files/:path*`    | `/files`, `/files/a/b`  | `path` only when non-empty    |
//! | `/users/:id(\d+)`  | `/users/42`             | `id → "42"`                   |
//! | `/:file.:ext`      | `/photo.jpg`            | `file → "photo"`, `ext → "jpg"` |
//! | `/static/*`        | `/static/css/app.css`   | `0 → "css/app.css"`           |
//! | `(.*)`             | anything                | `0 → <whole path>`            |
//!
//! A parameter may be preceded by `/` or `.`; that character becomes the
//! parameter's delimiter, which is also what repeated values are split on.
//! Unnamed groups and `*` get numeric names in order of appearance. One
//! trailing `/` on the request path is always tolerated.

use regex::{Regex, RegexBuilder};
use thiserror::Error;

use crate::context::{ParamValue, Params};

/// The pattern registered for handlers that should see every path.
pub const CATCH_ALL: &str = "(.*)";

const DEFAULT_DELIMITER: char = '/';

/// A route pattern that could not be compiled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("expected a parameter name after ':' at offset {offset} in {pattern:?}")]
    MissingName { pattern: String, offset: usize },

    #[error("unterminated group opened at offset {offset} in {pattern:?}")]
    UnterminatedGroup { pattern: String, offset: usize },

    #[error("empty group at offset {offset} in {pattern:?}")]
    EmptyGroup { pattern: String, offset: usize },

    #[error("trailing escape character in {pattern:?}")]
    DanglingEscape { pattern: String },

    #[error("parameter patterns in {pattern:?} must not contain capturing groups")]
    NestedCapture { pattern: String },

    #[error("invalid parameter pattern in {pattern:?}: {reason}")]
    Regex { pattern: String, reason: String },
}

/// Quantifier suffix of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    /// `?`: zero or one segment.
    Optional,
    /// `+`: one or more segments.
    OneOrMore,
    /// `*`: zero or more segments.
    ZeroOrMore,
}

impl Modifier {
    fn from_char(c: char) -> Option<Self> {
        match c {
            '?' => Some(Self::Optional),
            '+' => Some(Self::OneOrMore),
            '*' => Some(Self::ZeroOrMore),
            _ => None,
        }
    }
}

/// One parameter of a compiled pattern, in capture-group order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    name: String,
    prefix: Option<char>,
    delimiter: char,
    modifier: Option<Modifier>,
    // The parameter is followed by literal text other than its own prefix,
    // so an absent optional value must still consume the prefix.
    partial: bool,
    body: String,
}

impl Key {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    pub fn modifier(&self) -> Option<Modifier> {
        self.modifier
    }

    pub fn is_optional(&self) -> bool {
        matches!(
            self.modifier,
            Some(Modifier::Optional | Modifier::ZeroOrMore)
        )
    }

    pub fn is_repeated(&self) -> bool {
        matches!(
            self.modifier,
            Some(Modifier::OneOrMore | Modifier::ZeroOrMore)
        )
    }

    fn capture_source(&self) -> String {
        let prefix = self
            .prefix
            .map(|p| regex::escape(&p.to_string()))
            .unwrap_or_default();
        let mut capture = format!("(?:{})", self.body);
        if self.is_repeated() {
            capture = format!("{capture}(?:{prefix}{capture})*");
        }
        match (self.is_optional(), self.partial) {
            (true, false) => format!("(?:{prefix}({capture}))?"),
            (true, true) => format!("{prefix}({capture})?"),
            (false, _) => format!("{prefix}({capture})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Param(Key),
}

/// The result of a successful [`Matcher::match_path`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMatch {
    pub(crate) path: String,
    pub(crate) params: Option<Params>,
}

impl PathMatch {
    /// The path that matched.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The decoded parameters, or `None` when nothing was captured.
    pub fn params(&self) -> Option<&Params> {
        self.params.as_ref()
    }
}

/// A compiled route pattern.
///
/// Matchers hold no per-match state; one matcher can be used from any number
/// of threads at once.
#[derive(Debug, Clone)]
pub struct Matcher {
    pattern: String,
    regex: Regex,
    keys: Vec<Key>,
}

impl Matcher {
    /// The pattern this matcher was compiled from.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Parameter keys, aligned with the capture groups of the regex.
    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(Key::name)
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    /// Match `path` and extract its parameters.
    ///
    /// Captured values are percent-decoded, falling back to the raw text when
    /// decoding fails. Repeated parameters are split on their delimiter. Empty
    /// or absent captures produce no entry at all.
    ///
    /// ```
    /// use layered_router::router::pattern::compile;
    ///
    /// let matcher = compile("/files/:path+").unwrap();
    /// let found = matcher.match_path("/files/a/b%20c").unwrap();
    /// assert_eq!(found.params().unwrap().get_all("path").unwrap(), ["a", "b c"]);
    /// assert!(matcher.match_path("/files").is_none());
    /// ```
    pub fn match_path(&self, path: &str) -> Option<PathMatch> {
        let captures = self.regex.captures(path)?;
        let mut params = Params::new();

        for (key, capture) in self.keys.iter().zip(captures.iter().skip(1)) {
            let Some(raw) = capture.map(|m| m.as_str()).filter(|raw| !raw.is_empty()) else {
                continue;
            };
            let decoded = decode_param(raw);
            let value = if key.is_repeated() {
                ParamValue::Repeated(decoded.split(key.delimiter).map(str::to_owned).collect())
            } else {
                ParamValue::Single(decoded)
            };
            params.insert(key.name.clone(), value);
        }

        Some(PathMatch {
            path: path.to_owned(),
            params: (!params.is_empty()).then_some(params),
        })
    }
}

/// Compile `pattern` into a [`Matcher`].
///
/// # Errors
///
/// Returns a [`PatternError`] for malformed syntax: a `:` with no name after
/// it, an unterminated or empty `( )` group, a trailing `\`, a capturing group
/// inside a parameter's custom pattern, or a custom pattern the regex engine
/// rejects.
///
/// # Examples
///
/// ```
/// use layered_router::router::pattern::compile;
///
/// let matcher = compile("/users/:id").unwrap();
/// let found = matcher.match_path("/users/42").unwrap();
/// assert_eq!(found.params().unwrap().get("id"), Some("42"));
/// assert!(compile("/users/:").is_err());
/// ```
pub fn compile(pattern: &str) -> Result<Matcher, PatternError> {
    let tokens = tokenize(pattern)?;
    let source = regex_source(&tokens);
    let regex = RegexBuilder::new(&source)
        .case_insensitive(true)
        .build()
        .map_err(|e| PatternError::Regex {
            pattern: pattern.to_owned(),
            reason: e.to_string(),
        })?;

    let keys: Vec<Key> = tokens
        .into_iter()
        .filter_map(|token| match token {
            Token::Param(key) => Some(key),
            Token::Literal(_) => None,
        })
        .collect();

    if regex.captures_len() != keys.len() + 1 {
        return Err(PatternError::NestedCapture {
            pattern: pattern.to_owned(),
        });
    }

    Ok(Matcher {
        pattern: pattern.to_owned(),
        regex,
        keys,
    })
}

fn decode_param(raw: &str) -> String {
    match urlencoding::decode(raw) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => raw.to_owned(),
    }
}

fn regex_source(tokens: &[Token]) -> String {
    let mut source = String::from("^");
    let last = tokens.len().saturating_sub(1);

    for (i, token) in tokens.iter().enumerate() {
        match token {
            Token::Literal(text) => {
                // The trailing delimiter is re-added as optional below.
                let text = if i == last {
                    text.strip_suffix(DEFAULT_DELIMITER).unwrap_or(text)
                } else {
                    text
                };
                source.push_str(&regex::escape(text));
            }
            Token::Param(key) => source.push_str(&key.capture_source()),
        }
    }

    source.push_str("/?$");
    source
}

fn is_word(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

struct Tokenizer<'a> {
    pattern: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
    unnamed: usize,
}

fn tokenize(pattern: &str) -> Result<Vec<Token>, PatternError> {
    Tokenizer {
        pattern,
        chars: pattern.char_indices().collect(),
        pos: 0,
        unnamed: 0,
    }
    .run()
}

impl Tokenizer<'_> {
    fn peek(&self, at: usize) -> Option<char> {
        self.chars.get(at).map(|&(_, c)| c)
    }

    fn offset(&self, at: usize) -> usize {
        self.chars.get(at).map_or(self.pattern.len(), |&(offset, _)| offset)
    }

    fn run(mut self) -> Result<Vec<Token>, PatternError> {
        let mut tokens = Vec::new();
        let mut literal = String::new();

        while let Some(c) = self.peek(self.pos) {
            let prefix = match c {
                '\\' => {
                    let escaped = self
                        .peek(self.pos + 1)
                        .ok_or_else(|| PatternError::DanglingEscape {
                            pattern: self.pattern.to_owned(),
                        })?;
                    literal.push(escaped);
                    self.pos += 2;
                    continue;
                }
                '/' | '.' if matches!(self.peek(self.pos + 1), Some(':' | '(' | '*')) => {
                    self.pos += 1;
                    Some(c)
                }
                ':' | '(' | '*' => None,
                _ => {
                    literal.push(c);
                    self.pos += 1;
                    continue;
                }
            };

            if !literal.is_empty() {
                tokens.push(Token::Literal(std::mem::take(&mut literal)));
            }
            tokens.push(Token::Param(self.param(prefix)?));
        }

        if !literal.is_empty() {
            tokens.push(Token::Literal(literal));
        }
        Ok(tokens)
    }

    // Parses one parameter starting at `self.pos` (on `:`, `(` or `*`).
    fn param(&mut self, prefix: Option<char>) -> Result<Key, PatternError> {
        let start = self.pos;
        let delimiter = prefix.unwrap_or(DEFAULT_DELIMITER);
        let default_body = format!("[^{}]+?", regex::escape(&delimiter.to_string()));

        let (name, body, modifier) = match self.peek(start) {
            Some(':') => {
                let mut end = start + 1;
                while self.peek(end).is_some_and(is_word) {
                    end += 1;
                }
                if end == start + 1 {
                    return Err(PatternError::MissingName {
                        pattern: self.pattern.to_owned(),
                        offset: self.offset(start),
                    });
                }
                let name: String = self.chars[start + 1..end].iter().map(|&(_, c)| c).collect();
                self.pos = end;
                let body = if self.peek(self.pos) == Some('(') {
                    self.group()?
                } else {
                    default_body
                };
                (name, body, self.modifier())
            }
            Some('(') => {
                let body = self.group()?;
                (self.next_unnamed(), body, self.modifier())
            }
            _ => {
                self.pos = start + 1;
                (self.next_unnamed(), ".*".to_owned(), None)
            }
        };

        let partial =
            prefix.is_some() && self.peek(self.pos).is_some_and(|next| Some(next) != prefix);

        Ok(Key {
            name,
            prefix,
            delimiter,
            modifier,
            partial,
            body,
        })
    }

    fn next_unnamed(&mut self) -> String {
        let name = self.unnamed.to_string();
        self.unnamed += 1;
        name
    }

    fn modifier(&mut self) -> Option<Modifier> {
        let modifier = self.peek(self.pos).and_then(Modifier::from_char)?;
        self.pos += 1;
        Some(modifier)
    }

    // Reads a balanced `( ... )` group starting at `self.pos` and returns its
    // body with every nested group made non-capturing.
    fn group(&mut self) -> Result<String, PatternError> {
        let open = self.pos;
        let mut body = String::new();
        let mut depth = 0usize;
        let mut in_class = false;
        let mut at = open;

        loop {
            let Some(c) = self.peek(at) else {
                return Err(PatternError::UnterminatedGroup {
                    pattern: self.pattern.to_owned(),
                    offset: self.offset(open),
                });
            };
            match c {
                '\\' => {
                    let escaped = self.peek(at + 1).ok_or_else(|| PatternError::DanglingEscape {
                        pattern: self.pattern.to_owned(),
                    })?;
                    body.push('\\');
                    body.push(escaped);
                    at += 2;
                    continue;
                }
                '[' if !in_class => {
                    in_class = true;
                    body.push(c);
                }
                ']' if in_class => {
                    in_class = false;
                    body.push(c);
                }
                '(' if !in_class => {
                    depth += 1;
                    if depth > 1 {
                        body.push_str(if self.peek(at + 1) == Some('?') { "(" } else { "(?:" });
                    }
                }
                ')' if !in_class => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    body.push(c);
                }
                _ => body.push(c),
            }
            at += 1;
        }

        if body.is_empty() {
            return Err(PatternError::EmptyGroup {
                pattern: self.pattern.to_owned(),
                offset: self.offset(open),
            });
        }
        self.pos = at + 1;
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pattern: &str, path: &str) -> Option<Params> {
        compile(pattern)
            .unwrap()
            .match_path(path)
            .expect("path should match")
            .params
    }

    // ── tokenizing ────────────────────────────────────────────────────────────

    #[test]
    fn literal_only_pattern_has_no_keys() {
        let m = compile("/users/profile").unwrap();
        assert!(m.keys().is_empty());
        assert_eq!(m.pattern(), "/users/profile");
    }

    #[test]
    fn named_params_in_order() {
        let m = compile("/users/:id/posts/:post_id").unwrap();
        assert_eq!(m.param_names().collect::<Vec<_>>(), ["id", "post_id"]);
    }

    #[test]
    fn modifiers_are_recorded() {
        let m = compile("/a/:x?/:y+/:z*").unwrap();
        let mods: Vec<_> = m.keys().iter().map(Key::modifier).collect();
        assert_eq!(
            mods,
            [
                Some(Modifier::Optional),
                Some(Modifier::OneOrMore),
                Some(Modifier::ZeroOrMore)
            ]
        );
    }

    #[test]
    fn unnamed_groups_and_asterisks_are_numbered() {
        let m = compile("/static/*/(\\d+)").unwrap();
        assert_eq!(m.param_names().collect::<Vec<_>>(), ["0", "1"]);
    }

    #[test]
    fn dot_prefix_becomes_delimiter() {
        let m = compile("/:file.:ext").unwrap();
        assert_eq!(m.keys()[0].delimiter(), '/');
        assert_eq!(m.keys()[1].delimiter(), '.');
    }

    // ── matching ──────────────────────────────────────────────────────────────

    #[test]
    fn required_param_is_extracted() {
        let p = params("/users/:id", "/users/42").unwrap();
        assert_eq!(p.get("id"), Some("42"));
        assert_eq!(p.len(), 1);
    }

    #[test]
    fn required_param_missing_segment_does_not_match() {
        let m = compile("/users/:id").unwrap();
        assert!(m.match_path("/users").is_none());
        assert!(m.match_path("/users/").is_none());
        assert!(m.match_path("/users/42/extra").is_none());
    }

    #[test]
    fn values_are_percent_decoded() {
        let p = params("/users/:name", "/users/J%C3%BCrgen%20M").unwrap();
        assert_eq!(p.get("name"), Some("Jürgen M"));
    }

    #[test]
    fn undecodable_values_fall_back_to_raw() {
        let p = params("/users/:name", "/users/%FF").unwrap();
        assert_eq!(p.get("name"), Some("%FF"));
    }

    #[test]
    fn one_or_more_splits_on_delimiter() {
        let p = params("/:x+", "/a/b/c").unwrap();
        assert_eq!(p.get_all("x").unwrap(), ["a", "b", "c"]);
    }

    #[test]
    fn one_or_more_rejects_empty() {
        let m = compile("/:x+").unwrap();
        assert!(m.match_path("/").is_none());
    }

    #[test]
    fn one_or_more_single_segment_is_still_a_list() {
        let p = params("/:x+", "/only").unwrap();
        assert_eq!(p.get_all("x").unwrap(), ["only"]);
    }

    #[test]
    fn zero_or_more_on_root_matches_without_params() {
        assert!(params("/:x*", "/").is_none());
    }

    #[test]
    fn zero_or_more_with_segments() {
        let p = params("/files/:rest*", "/files/css/app.css").unwrap();
        assert_eq!(p.get_all("rest").unwrap(), ["css", "app.css"]);
        assert!(params("/files/:rest*", "/files").is_none());
    }

    #[test]
    fn optional_param_may_be_absent() {
        assert!(params("/users/:id?", "/users").is_none());
        assert_eq!(params("/users/:id?", "/users/7").unwrap().get("id"), Some("7"));
    }

    #[test]
    fn custom_param_pattern_constrains_value() {
        let m = compile(r"/users/:id(\d+)").unwrap();
        assert!(m.is_match("/users/42"));
        assert!(!m.is_match("/users/abc"));
    }

    #[test]
    fn nested_groups_in_custom_pattern_do_not_capture() {
        let m = compile("/:kind(post(s)?|page)").unwrap();
        assert_eq!(m.keys().len(), 1);
        let found = m.match_path("/posts").unwrap();
        assert_eq!(found.params().unwrap().get("kind"), Some("posts"));
    }

    #[test]
    fn dot_separated_params() {
        let p = params("/:file.:ext", "/photo.jpg").unwrap();
        assert_eq!(p.get("file"), Some("photo"));
        assert_eq!(p.get("ext"), Some("jpg"));
    }

    #[test]
    fn asterisk_captures_the_rest() {
        let p = params("/static/*", "/static/css/app.css").unwrap();
        assert_eq!(p.get("0"), Some("css/app.css"));
    }

    #[test]
    fn catch_all_matches_everything() {
        let m = compile(CATCH_ALL).unwrap();
        assert!(m.is_match("/"));
        assert!(m.is_match("/a/b/c"));
        assert_eq!(params(CATCH_ALL, "/a/b").unwrap().get("0"), Some("/a/b"));
    }

    #[test]
    fn matching_is_anchored() {
        let m = compile("/users").unwrap();
        assert!(!m.is_match("/users/42"));
        assert!(!m.is_match("/api/users"));
    }

    #[test]
    fn one_trailing_slash_is_tolerated() {
        let m = compile("/users").unwrap();
        assert!(m.is_match("/users/"));
        assert!(!m.is_match("/users//"));
        let m = compile("/api/").unwrap();
        assert!(m.is_match("/api"));
        assert!(m.is_match("/api/"));
    }

    #[test]
    fn root_pattern() {
        let m = compile("/").unwrap();
        assert!(m.is_match("/"));
        assert!(!m.is_match("/x"));
    }

    #[test]
    fn matching_ignores_case() {
        assert!(compile("/Users/:id").unwrap().is_match("/USERS/1"));
    }

    #[test]
    fn escaped_characters_are_literal() {
        let m = compile(r"/time\:now").unwrap();
        assert!(m.keys().is_empty());
        assert!(m.is_match("/time:now"));
    }

    #[test]
    fn regex_metacharacters_in_literals_are_escaped() {
        let m = compile("/v1.0/a+b").unwrap();
        assert!(m.is_match("/v1.0/a+b"));
        assert!(!m.is_match("/v1x0/aab"));
    }

    // ── errors ────────────────────────────────────────────────────────────────

    #[test]
    fn colon_without_name_is_rejected() {
        assert_eq!(
            compile("/users/:").unwrap_err(),
            PatternError::MissingName {
                pattern: "/users/:".into(),
                offset: 7
            }
        );
        assert!(matches!(
            compile("/:/x").unwrap_err(),
            PatternError::MissingName { offset: 1, .. }
        ));
    }

    #[test]
    fn unterminated_group_is_rejected() {
        assert!(matches!(
            compile(r"/users/:id(\d+").unwrap_err(),
            PatternError::UnterminatedGroup { offset: 10, .. }
        ));
    }

    #[test]
    fn empty_group_is_rejected() {
        assert!(matches!(
            compile("/users/()").unwrap_err(),
            PatternError::EmptyGroup { .. }
        ));
    }

    #[test]
    fn dangling_escape_is_rejected() {
        assert!(matches!(
            compile("/users\\").unwrap_err(),
            PatternError::DanglingEscape { .. }
        ));
    }

    #[test]
    fn capturing_group_in_custom_pattern_is_rejected() {
        assert!(matches!(
            compile("/:id((?P<inner>x))").unwrap_err(),
            PatternError::NestedCapture { .. }
        ));
    }

    #[test]
    fn unsupported_regex_is_rejected() {
        assert!(matches!(
            compile("/:id((?=x))").unwrap_err(),
            PatternError::Regex { .. }
        ));
    }
}
