// Copyright 2024 FastLabs Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::mem;
use std::path::Path;
use std::path::PathBuf;
use std::path::is_separator;

use jiff::Timestamp;
use jiff::Zoned;
use jiff::tz::TimeZone;

use crate::Error;
use crate::ErrorKind;

/// Resolve a path template against an instant.
///
/// Each `strftime`-style directive in `template` (`%Y`, `%m`, `%d`, `%H`, `%M`, `%S`, ...) is
/// substituted with the corresponding field of `instant`; everything else is kept literally.
///
/// # Examples
///
/// ```
/// use jiff::Zoned;
///
/// let now: Zoned = "2024-08-10T17:12:52[UTC]".parse().unwrap();
/// let path = rotatelogs::resolve("/var/log/app.%Y%m%d%H", &now).unwrap();
/// assert_eq!(path.to_str(), Some("/var/log/app.2024081017"));
/// ```
pub fn resolve(template: &str, instant: &Zoned) -> Result<PathBuf, Error> {
    jiff::fmt::strtime::format(template, instant)
        .map(PathBuf::from)
        .map_err(|err| {
            Error::new(ErrorKind::ConfigInvalid, "failed to resolve path template")
                .with_context("template", template)
                .with_source(err)
        })
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Directive,
}

/// A validated, absolute path template bound to a time zone.
#[derive(Debug, Clone)]
pub(crate) struct PathPattern {
    template: String,
    timezone: TimeZone,
    tokens: Vec<Token>,
}

impl PathPattern {
    pub(crate) fn new(template: &str, timezone: TimeZone) -> Result<Self, Error> {
        if template.is_empty() {
            return Err(Error::new(
                ErrorKind::ConfigInvalid,
                "path template must not be empty",
            ));
        }

        let template = absolutize(template)?;
        let tokens = tokenize(&template)?;
        let pattern = PathPattern {
            template,
            timezone,
            tokens,
        };

        // surface unknown directives now rather than on the first write
        pattern.resolve(Timestamp::UNIX_EPOCH)?;
        Ok(pattern)
    }

    pub(crate) fn template(&self) -> &str {
        &self.template
    }

    pub(crate) fn resolve(&self, instant: Timestamp) -> Result<PathBuf, Error> {
        resolve(&self.template, &instant.to_zoned(self.timezone.clone()))
    }

    /// Whether `path` could have been produced by this pattern, optionally carrying a `.N`
    /// collision suffix.
    pub(crate) fn matches(&self, path: &Path) -> bool {
        let Some(path) = path.to_str() else {
            return false;
        };

        if match_tokens(&self.tokens, path) {
            return true;
        }

        match path.rfind('.') {
            Some(pos) => {
                let suffix = &path[pos + 1..];
                !suffix.is_empty()
                    && suffix.bytes().all(|b| b.is_ascii_digit())
                    && match_tokens(&self.tokens, &path[..pos])
            }
            None => false,
        }
    }

    /// The directory that holds every file this pattern resolves to, if that directory does not
    /// itself depend on time.
    pub(crate) fn search_dir(&self) -> Option<PathBuf> {
        let literal = match self.tokens.iter().position(|t| *t == Token::Directive) {
            None => self.literal_prefix(self.tokens.len()),
            Some(idx) => {
                let tail_has_separator = self.tokens[idx..].iter().any(|t| match t {
                    Token::Literal(s) => s.chars().any(is_separator),
                    Token::Directive => false,
                });
                if tail_has_separator {
                    return None;
                }
                // stands in for the file name part that starts with a directive
                let mut head = self.literal_prefix(idx);
                head.push('_');
                head
            }
        };

        Path::new(&literal).parent().map(Path::to_path_buf)
    }

    fn literal_prefix(&self, n: usize) -> String {
        self.tokens[..n]
            .iter()
            .filter_map(|t| match t {
                Token::Literal(s) => Some(s.as_str()),
                Token::Directive => None,
            })
            .collect()
    }
}

fn absolutize(template: &str) -> Result<String, Error> {
    if Path::new(template).is_absolute() {
        return Ok(template.to_string());
    }

    let cwd = std::env::current_dir().map_err(|err| {
        Error::new(ErrorKind::ConfigInvalid, "failed to get current directory").with_source(err)
    })?;
    let cwd = cwd.to_str().ok_or_else(|| {
        Error::new(ErrorKind::ConfigInvalid, "current directory is not valid UTF-8")
            .with_context("cwd", cwd.display())
    })?;

    // a '%' in the working directory is a literal, not a directive
    let cwd = cwd.replace('%', "%%");
    let path = Path::new(&cwd).join(template);
    match path.into_os_string().into_string() {
        Ok(path) => Ok(path),
        Err(path) => Err(Error::new(
            ErrorKind::ConfigInvalid,
            "path template is not valid UTF-8",
        )
        .with_context("template", path.to_string_lossy())),
    }
}

fn tokenize(template: &str) -> Result<Vec<Token>, Error> {
    let mut tokens = vec![];
    let mut literal = String::new();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            literal.push(c);
            continue;
        }

        // flags, padding width, and precision
        while chars
            .peek()
            .is_some_and(|c| matches!(c, '-' | '_' | '^' | '#' | ':' | '.' | '0'..='9'))
        {
            chars.next();
        }

        match chars.next() {
            None => {
                return Err(Error::new(
                    ErrorKind::ConfigInvalid,
                    "path template ends with an incomplete directive",
                )
                .with_context("template", template));
            }
            Some('%') => literal.push('%'),
            Some('n') => literal.push('\n'),
            Some('t') => literal.push('\t'),
            Some(_) => {
                if !literal.is_empty() {
                    tokens.push(Token::Literal(mem::take(&mut literal)));
                }
                tokens.push(Token::Directive);
            }
        }
    }

    if !literal.is_empty() {
        tokens.push(Token::Literal(literal));
    }
    Ok(tokens)
}

// a directive stands for one or more characters within a single path component
fn match_tokens(tokens: &[Token], text: &str) -> bool {
    match tokens.split_first() {
        None => text.is_empty(),
        Some((Token::Literal(lit), rest)) => text
            .strip_prefix(lit.as_str())
            .is_some_and(|text| match_tokens(rest, text)),
        Some((Token::Directive, rest)) => {
            for (i, c) in text.char_indices() {
                if is_separator(c) {
                    break;
                }
                if match_tokens(rest, &text[i + c.len_utf8()..]) {
                    return true;
                }
            }
            false
        }
    }
}
