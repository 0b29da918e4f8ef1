//! Whitespace token reader shared by the text asset parsers

use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;

use super::{AssetError, AssetResult};
use crate::foundation::math::{Mat4, Vec2, Vec3, Vec4};

/// Reads whitespace separated tokens, with line access for name lists
pub(crate) struct TokenReader<'a> {
    path: &'a Path,
    source: &'a str,
    cursor: usize,
}

impl<'a> TokenReader<'a> {
    pub(crate) const fn new(path: &'a Path, source: &'a str) -> Self {
        Self { path, source, cursor: 0 }
    }

    pub(crate) fn next_token(&mut self) -> Option<&'a str> {
        let source = self.source;
        let rest = &source[self.cursor..];
        let start = self.cursor + (rest.len() - rest.trim_start().len());
        let tail = &source[start..];
        let len = tail.find(char::is_whitespace).unwrap_or(tail.len());
        self.cursor = start + len;
        (len > 0).then_some(&tail[..len])
    }

    pub(crate) fn token(&mut self, what: &str) -> AssetResult<&'a str> {
        self.next_token()
            .ok_or_else(|| self.parse_error(format!("unexpected end of file reading {what}")))
    }

    pub(crate) fn parse<T>(&mut self, what: &str) -> AssetResult<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        let token = self.token(what)?;
        token
            .parse()
            .map_err(|e| self.parse_error(format!("invalid {what} '{token}': {e}")))
    }

    /// Discard the remainder of the current line
    pub(crate) fn skip_line(&mut self) {
        self.cursor = match self.source[self.cursor..].find('\n') {
            Some(i) => self.cursor + i + 1,
            None => self.source.len(),
        };
    }

    /// Next full line without its terminator
    pub(crate) fn line(&mut self, what: &str) -> AssetResult<&'a str> {
        if self.cursor >= self.source.len() {
            return Err(self.parse_error(format!("unexpected end of file reading {what}")));
        }
        let source = self.source;
        let rest = &source[self.cursor..];
        let len = rest.find('\n').unwrap_or(rest.len());
        self.cursor += (len + 1).min(rest.len());
        Ok(rest[..len].trim_end_matches('\r'))
    }

    pub(crate) fn vec2(&mut self, what: &str) -> AssetResult<Vec2> {
        Ok(Vec2::new(self.parse(what)?, self.parse(what)?))
    }

    pub(crate) fn vec3(&mut self, what: &str) -> AssetResult<Vec3> {
        Ok(Vec3::new(self.parse(what)?, self.parse(what)?, self.parse(what)?))
    }

    pub(crate) fn vec4(&mut self, what: &str) -> AssetResult<Vec4> {
        Ok(Vec4::new(
            self.parse(what)?,
            self.parse(what)?,
            self.parse(what)?,
            self.parse(what)?,
        ))
    }

    pub(crate) fn ivec4(&mut self, what: &str) -> AssetResult<[i32; 4]> {
        Ok([
            self.parse(what)?,
            self.parse(what)?,
            self.parse(what)?,
            self.parse(what)?,
        ])
    }

    /// Sixteen floats in storage order, four per column
    pub(crate) fn mat4(&mut self, what: &str) -> AssetResult<Mat4> {
        let mut values = [0.0f32; 16];
        for value in &mut values {
            *value = self.parse(what)?;
        }
        Ok(Mat4::from_column_slice(&values))
    }

    pub(crate) fn parse_error(&self, reason: String) -> AssetError {
        AssetError::Parse {
            path: self.path.to_path_buf(),
            reason,
        }
    }

    pub(crate) fn format_error(&self, reason: String) -> AssetError {
        AssetError::Format {
            path: self.path.to_path_buf(),
            reason,
        }
    }
}
