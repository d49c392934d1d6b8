//! LDAP 风格过滤表达式
//!
//! 语法（RFC 1960 子集）：
//!
//! ```text
//! filter     ::= '(' filtercomp ')'
//! filtercomp ::= and | or | not | item
//! and        ::= '&' filter+
//! or         ::= '|' filter+
//! not        ::= '!' filter
//! item       ::= attr ('=' | '~=' | '>=' | '<=') value | attr '=*'
//! ```
//!
//! 值中出现的 `*` 表示子串通配，`\` 用于转义 `(`、`)`、`*` 和 `\`。
//! 属性名大小写不敏感。嵌套层数上限为 [`MAX_FILTER_DEPTH`]。

use crate::errors::FilterError;
use crate::properties::{Properties, PropertyValue, OBJECTCLASS};
use std::fmt;
use std::str::FromStr;

/// 已解析的过滤表达式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Equal { attr: String, value: String },
    Approx { attr: String, value: String },
    GreaterEq { attr: String, value: String },
    LessEq { attr: String, value: String },
    Present { attr: String },
    Substring {
        attr: String,
        initial: Option<String>,
        any: Vec<String>,
        last: Option<String>,
    },
}

impl Filter {
    /// 解析过滤表达式
    pub fn parse(input: &str) -> Result<Self, FilterError> {
        Parser::new(input).parse()
    }

    /// 匹配指定接口的过滤器 `(objectClass=<interface>)`
    pub fn object_class(interface: impl Into<String>) -> Self {
        Self::Equal {
            attr: OBJECTCLASS.to_string(),
            value: interface.into(),
        }
    }

    /// 用当前过滤器与另一过滤器组成 `&`
    pub fn and(self, other: Filter) -> Self {
        match self {
            Self::And(mut clauses) => {
                clauses.push(other);
                Self::And(clauses)
            }
            first => Self::And(vec![first, other]),
        }
    }

    /// 对属性映射求值
    pub fn matches(&self, properties: &Properties) -> bool {
        match self {
            Self::And(clauses) => clauses.iter().all(|clause| clause.matches(properties)),
            Self::Or(clauses) => clauses.iter().any(|clause| clause.matches(properties)),
            Self::Not(inner) => !inner.matches(properties),
            Self::Present { attr } => properties.contains_key(attr),
            Self::Equal { attr, .. }
            | Self::Approx { attr, .. }
            | Self::GreaterEq { attr, .. }
            | Self::LessEq { attr, .. }
            | Self::Substring { attr, .. } => properties
                .get(attr)
                .is_some_and(|value| self.compare(value)),
        }
    }

    fn compare(&self, property: &PropertyValue) -> bool {
        match property {
            PropertyValue::List(values) => values.iter().any(|value| self.compare(value)),
            PropertyValue::String(value) => self.compare_string(value),
            PropertyValue::Integer(value) => self.compare_ordered(|operand| {
                operand.trim().parse::<i64>().ok().map(|operand| value.cmp(&operand))
            }),
            PropertyValue::Float(value) => self.compare_ordered(|operand| {
                operand
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .and_then(|operand| value.partial_cmp(&operand))
            }),
            PropertyValue::Bool(value) => match self {
                Self::Equal { value: operand, .. }
                | Self::Approx { value: operand, .. }
                | Self::GreaterEq { value: operand, .. }
                | Self::LessEq { value: operand, .. } => {
                    *value == operand.trim().eq_ignore_ascii_case("true")
                }
                _ => false,
            },
        }
    }

    fn compare_ordered<F>(&self, ordering: F) -> bool
    where
        F: Fn(&str) -> Option<std::cmp::Ordering>,
    {
        use std::cmp::Ordering;

        match self {
            Self::Equal { value, .. } | Self::Approx { value, .. } => {
                ordering(value) == Some(Ordering::Equal)
            }
            Self::GreaterEq { value, .. } => {
                matches!(ordering(value), Some(Ordering::Greater | Ordering::Equal))
            }
            Self::LessEq { value, .. } => {
                matches!(ordering(value), Some(Ordering::Less | Ordering::Equal))
            }
            _ => false,
        }
    }

    fn compare_string(&self, property: &str) -> bool {
        match self {
            Self::Equal { value, .. } => property == value,
            Self::Approx { value, .. } => approx(property).eq_ignore_ascii_case(&approx(value)),
            Self::GreaterEq { value, .. } => property >= value.as_str(),
            Self::LessEq { value, .. } => property <= value.as_str(),
            Self::Substring {
                initial, any, last, ..
            } => {
                let mut rest = property;
                if let Some(initial) = initial {
                    match rest.strip_prefix(initial.as_str()) {
                        Some(tail) => rest = tail,
                        None => return false,
                    }
                }
                for part in any {
                    match rest.find(part.as_str()) {
                        Some(index) => rest = &rest[index + part.len()..],
                        None => return false,
                    }
                }
                last.as_ref().map_or(true, |last| rest.ends_with(last.as_str()))
            }
            _ => false,
        }
    }
}

fn approx(value: &str) -> String {
    value.chars().filter(|c| !c.is_whitespace()).collect()
}

fn encode_value(value: &str, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for c in value.chars() {
        if matches!(c, '(' | ')' | '*' | '\\') {
            f.write_str("\\")?;
        }
        write!(f, "{c}")?;
    }
    Ok(())
}

impl fmt::Display for Filter {
    /// 规范化输出，可被重新解析为等价过滤器
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        match self {
            Self::And(clauses) => {
                f.write_str("&")?;
                for clause in clauses {
                    write!(f, "{clause}")?;
                }
            }
            Self::Or(clauses) => {
                f.write_str("|")?;
                for clause in clauses {
                    write!(f, "{clause}")?;
                }
            }
            Self::Not(inner) => write!(f, "!{inner}")?,
            Self::Equal { attr, value } => {
                write!(f, "{attr}=")?;
                encode_value(value, f)?;
            }
            Self::Approx { attr, value } => {
                write!(f, "{attr}~=")?;
                encode_value(value, f)?;
            }
            Self::GreaterEq { attr, value } => {
                write!(f, "{attr}>=")?;
                encode_value(value, f)?;
            }
            Self::LessEq { attr, value } => {
                write!(f, "{attr}<=")?;
                encode_value(value, f)?;
            }
            Self::Present { attr } => write!(f, "{attr}=*")?,
            Self::Substring {
                attr,
                initial,
                any,
                last,
            } => {
                write!(f, "{attr}=")?;
                if let Some(initial) = initial {
                    encode_value(initial, f)?;
                }
                f.write_str("*")?;
                for part in any {
                    encode_value(part, f)?;
                    f.write_str("*")?;
                }
                if let Some(last) = last {
                    encode_value(last, f)?;
                }
            }
        }
        f.write_str(")")
    }
}

impl FromStr for Filter {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// 值中的片段：普通文本或未转义的 `*`
enum Piece {
    Text(String),
    Star,
}

/// 最大嵌套深度，超出时返回语法错误而不是耗尽调用栈
pub const MAX_FILTER_DEPTH: usize = 256;

struct Parser<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            bytes: input.as_bytes(),
            pos: 0,
            depth: 0,
        }
    }

    fn error(&self, message: &str) -> FilterError {
        FilterError::new(self.input, self.pos, message)
    }

    fn parse(mut self) -> Result<Filter, FilterError> {
        self.skip_whitespace();
        if self.pos >= self.bytes.len() {
            return Err(self.error("过滤表达式为空"));
        }
        let filter = self.parse_filter()?;
        self.skip_whitespace();
        if self.pos < self.bytes.len() {
            return Err(self.error("表达式末尾存在多余字符"));
        }
        Ok(filter)
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, expected: u8, message: &str) -> Result<(), FilterError> {
        if self.peek() == Some(expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(message))
        }
    }

    fn parse_filter(&mut self) -> Result<Filter, FilterError> {
        self.skip_whitespace();
        if self.depth >= MAX_FILTER_DEPTH {
            return Err(self.error("表达式嵌套过深"));
        }
        self.depth += 1;
        let filter = self.parse_clause();
        self.depth -= 1;
        filter
    }

    fn parse_clause(&mut self) -> Result<Filter, FilterError> {
        self.expect(b'(', "缺少 \"(\"")?;
        self.skip_whitespace();

        let filter = match self.peek() {
            Some(b'&') => {
                self.pos += 1;
                Filter::And(self.parse_filter_list()?)
            }
            Some(b'|') => {
                self.pos += 1;
                Filter::Or(self.parse_filter_list()?)
            }
            Some(b'!') => {
                self.pos += 1;
                Filter::Not(Box::new(self.parse_filter()?))
            }
            Some(_) => self.parse_item()?,
            None => return Err(self.error("表达式意外结束")),
        };

        self.skip_whitespace();
        self.expect(b')', "缺少 \")\"")?;
        Ok(filter)
    }

    fn parse_filter_list(&mut self) -> Result<Vec<Filter>, FilterError> {
        let mut clauses = Vec::new();
        loop {
            self.skip_whitespace();
            if self.peek() != Some(b'(') {
                break;
            }
            clauses.push(self.parse_filter()?);
        }
        if clauses.is_empty() {
            return Err(self.error("组合表达式缺少子表达式"));
        }
        Ok(clauses)
    }

    fn parse_item(&mut self) -> Result<Filter, FilterError> {
        let attr = self.parse_attr()?;

        let operator = match (self.peek(), self.bytes.get(self.pos + 1).copied()) {
            (Some(b'='), _) => {
                self.pos += 1;
                b'='
            }
            (Some(op @ (b'~' | b'>' | b'<')), Some(b'=')) => {
                self.pos += 2;
                op
            }
            _ => return Err(self.error("无效的比较运算符")),
        };

        let pieces = self.parse_value()?;

        if operator != b'=' {
            let mut value = String::new();
            for piece in pieces {
                match piece {
                    Piece::Text(text) => value.push_str(&text),
                    Piece::Star => return Err(self.error("通配符只能用于 \"=\"")),
                }
            }
            return Ok(match operator {
                b'~' => Filter::Approx { attr, value },
                b'>' => Filter::GreaterEq { attr, value },
                _ => Filter::LessEq { attr, value },
            });
        }

        if !pieces.iter().any(|piece| matches!(piece, Piece::Star)) {
            let value = pieces
                .into_iter()
                .map(|piece| match piece {
                    Piece::Text(text) => text,
                    Piece::Star => String::new(),
                })
                .collect();
            return Ok(Filter::Equal { attr, value });
        }

        if pieces.len() == 1 {
            return Ok(Filter::Present { attr });
        }

        Ok(Self::build_substring(attr, pieces))
    }

    fn build_substring(attr: String, pieces: Vec<Piece>) -> Filter {
        let mut initial = None;
        let mut any = Vec::new();
        let mut last = None;

        let count = pieces.len();
        for (index, piece) in pieces.into_iter().enumerate() {
            if let Piece::Text(text) = piece {
                if index == 0 {
                    initial = Some(text);
                } else if index == count - 1 {
                    last = Some(text);
                } else {
                    any.push(text);
                }
            }
        }

        Filter::Substring {
            attr,
            initial,
            any,
            last,
        }
    }

    fn parse_attr(&mut self) -> Result<String, FilterError> {
        self.skip_whitespace();
        let start = self.pos;
        while let Some(b) = self.peek() {
            if matches!(b, b'=' | b'~' | b'<' | b'>' | b'(' | b')') {
                break;
            }
            self.pos += 1;
        }
        let attr = self.input[start..self.pos].trim_end();
        if attr.is_empty() {
            return Err(self.error("缺少属性名"));
        }
        Ok(attr.to_string())
    }

    /// 解析值直到未转义的 `)`，相邻的 `*` 折叠为一个
    fn parse_value(&mut self) -> Result<Vec<Piece>, FilterError> {
        let mut pieces = Vec::new();
        let mut text = String::new();

        loop {
            let rest = &self.input[self.pos..];
            let Some(c) = rest.chars().next() else {
                return Err(self.error("缺少 \")\""));
            };
            match c {
                ')' => break,
                '(' => return Err(self.error("值中存在未转义的 \"(\"")),
                '*' => {
                    self.pos += 1;
                    if !text.is_empty() {
                        pieces.push(Piece::Text(std::mem::take(&mut text)));
                    }
                    if !matches!(pieces.last(), Some(Piece::Star)) {
                        pieces.push(Piece::Star);
                    }
                }
                '\\' => {
                    self.pos += 1;
                    let escaped = self.input[self.pos..]
                        .chars()
                        .next()
                        .ok_or_else(|| self.error("转义符后缺少字符"))?;
                    self.pos += escaped.len_utf8();
                    text.push(escaped);
                }
                other => {
                    self.pos += other.len_utf8();
                    text.push(other);
                }
            }
        }

        if !text.is_empty() || pieces.is_empty() {
            pieces.push(Piece::Text(text));
        }
        Ok(pieces)
    }
}
