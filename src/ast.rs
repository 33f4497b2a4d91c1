//! Declaration language node model, parser and formatter
//!
//! Covers the line-oriented subset of the syzkaller description language
//! that the extraction tool emits:
//!
//! ```text
//! # comment
//! include <include/linux/types.h>
//! open_flags = O_RDONLY, O_WRONLY
//! resource fd_foo[fd]: FOO_INVALID
//! type foo_handle int32
//! ioctl$FOO(fd fd_foo, cmd const[FOO], arg ptr[in, foo_arg])
//! foo_arg {
//!         len     len[data, int32]
//!         data    array[int8]
//! } [packed]
//! ```
//!
//! Each node keeps the position it was parsed from. Positions never take part
//! in serialization, so the serialized form doubles as structural identity.

use std::fmt;

/// Source position of a node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pos {
    pub file: String,
    pub line: usize,
}

/// Discriminant of a [`Node`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeKind {
    Comment,
    Include,
    IntFlags,
    Resource,
    TypeDef,
    Call,
    Struct,
    NewLine,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Comment => "comment",
            NodeKind::Include => "include",
            NodeKind::IntFlags => "flags",
            NodeKind::Resource => "resource",
            NodeKind::TypeDef => "type",
            NodeKind::Call => "syscall",
            NodeKind::Struct => "struct",
            NodeKind::NewLine => "new line",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub pos: Pos,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Include {
    pub pos: Pos,
    pub file: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntFlags {
    pub pos: Pos,
    pub name: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub pos: Pos,
    pub name: String,
    pub base: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDef {
    pub pos: Pos,
    pub name: String,
    /// Everything after the name: optional template params and the aliased type
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub pos: Pos,
    /// Display name including the variant, e.g. `ioctl$FOO`
    pub name: String,
    /// Name before the first `$`; for extracted calls this is the entry point
    pub call_name: String,
    pub args: Vec<String>,
    /// Return type and attributes following the argument list
    pub tail: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Struct {
    pub pos: Pos,
    pub name: String,
    pub is_union: bool,
    pub fields: Vec<String>,
    pub attrs: String,
}

/// One top-level declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Comment(Comment),
    Include(Include),
    IntFlags(IntFlags),
    Resource(Resource),
    TypeDef(TypeDef),
    Call(Call),
    Struct(Struct),
    NewLine(Pos),
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Comment(_) => NodeKind::Comment,
            Node::Include(_) => NodeKind::Include,
            Node::IntFlags(_) => NodeKind::IntFlags,
            Node::Resource(_) => NodeKind::Resource,
            Node::TypeDef(_) => NodeKind::TypeDef,
            Node::Call(_) => NodeKind::Call,
            Node::Struct(_) => NodeKind::Struct,
            Node::NewLine(_) => NodeKind::NewLine,
        }
    }

    pub fn pos(&self) -> &Pos {
        match self {
            Node::Comment(n) => &n.pos,
            Node::Include(n) => &n.pos,
            Node::IntFlags(n) => &n.pos,
            Node::Resource(n) => &n.pos,
            Node::TypeDef(n) => &n.pos,
            Node::Call(n) => &n.pos,
            Node::Struct(n) => &n.pos,
            Node::NewLine(pos) => pos,
        }
    }

    /// Declared name; empty for comments and blank lines
    pub fn name(&self) -> &str {
        match self {
            Node::Comment(_) | Node::NewLine(_) => "",
            Node::Include(n) => &n.file,
            Node::IntFlags(n) => &n.name,
            Node::Resource(n) => &n.name,
            Node::TypeDef(n) => &n.name,
            Node::Call(n) => &n.name,
            Node::Struct(n) => &n.name,
        }
    }

    /// Position, kind and name in one go
    pub fn info(&self) -> (&Pos, NodeKind, &str) {
        (self.pos(), self.kind(), self.name())
    }

    /// Identifiers this declaration refers to (member and argument names excluded)
    pub fn references(&self) -> Vec<&str> {
        match self {
            Node::Comment(_) | Node::Include(_) | Node::NewLine(_) => Vec::new(),
            Node::IntFlags(n) => n.values.iter().flat_map(|v| identifiers(v)).collect(),
            Node::Resource(n) => identifiers(&n.base)
                .chain(n.values.iter().flat_map(|v| identifiers(v)))
                .collect(),
            Node::TypeDef(n) => identifiers(&n.body).collect(),
            Node::Call(n) => n
                .args
                .iter()
                .flat_map(|a| identifiers(after_member_name(a)))
                .chain(identifiers(&n.tail))
                .collect(),
            Node::Struct(n) => n
                .fields
                .iter()
                .filter(|f| !f.starts_with('#'))
                .flat_map(|f| identifiers(after_member_name(f)))
                .chain(identifiers(&n.attrs))
                .collect(),
        }
    }
}

fn after_member_name(member: &str) -> &str {
    member
        .split_once(char::is_whitespace)
        .map_or("", |(_, rest)| rest)
}

/// Split text into identifier tokens
pub fn identifiers(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|tok| tok.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_'))
}

/// A parsed description file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Description {
    pub nodes: Vec<Node>,
}

/// Parse failure with the location of the offending line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub file: String,
    pub line: usize,
    pub message: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.file, self.line, self.message)
    }
}

impl std::error::Error for ParseError {}

/// Parse description text; `file` is recorded in every node position
pub fn parse(text: &str, file: &str) -> Result<Description, ParseError> {
    let mut nodes = Vec::new();
    let lines: Vec<&str> = text.lines().collect();
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i].trim();
        let lineno = i + 1;
        let pos = Pos {
            file: file.to_string(),
            line: lineno,
        };
        let err = |message: String| ParseError {
            file: file.to_string(),
            line: lineno,
            message,
        };
        i += 1;

        if line.is_empty() {
            nodes.push(Node::NewLine(pos));
            continue;
        }
        if let Some(text) = line.strip_prefix('#') {
            nodes.push(Node::Comment(Comment {
                pos,
                text: text.trim().to_string(),
            }));
            continue;
        }
        if let Some(rest) = keyword(line, "include") {
            let file = rest
                .strip_prefix('<')
                .and_then(|r| r.strip_suffix('>'))
                .ok_or_else(|| err(format!("bad include {rest:?}")))?;
            nodes.push(Node::Include(Include {
                pos,
                file: file.trim().to_string(),
            }));
            continue;
        }
        if let Some(rest) = keyword(line, "resource") {
            nodes.push(Node::Resource(parse_resource(rest, pos).map_err(err)?));
            continue;
        }
        if let Some(rest) = keyword(line, "type") {
            let (name, body) = split_ident(rest);
            if name.is_empty() || body.trim().is_empty() {
                return Err(err(format!("bad type alias {rest:?}")));
            }
            let body = if body.starts_with('[') {
                collapse_ws(body)
            } else {
                collapse_ws(body.trim())
            };
            nodes.push(Node::TypeDef(TypeDef {
                pos,
                name: name.to_string(),
                body,
            }));
            continue;
        }

        let (name, rest) = split_ident(line);
        if name.is_empty() {
            return Err(err(format!("unexpected {line:?}")));
        }
        let rest = rest.trim_start();
        if let Some(values) = rest.strip_prefix('=') {
            let values = split_list(values);
            if values.is_empty() {
                return Err(err(format!("flags {name} have no values")));
            }
            nodes.push(Node::IntFlags(IntFlags {
                pos,
                name: name.to_string(),
                values,
            }));
        } else if rest.starts_with('(') {
            nodes.push(Node::Call(parse_call(name, rest, pos).map_err(err)?));
        } else if rest == "{" || rest == "[" {
            let is_union = rest == "[";
            let close = if is_union { ']' } else { '}' };
            let mut fields = Vec::new();
            let attrs = loop {
                let Some(member) = lines.get(i) else {
                    return Err(err(format!("unterminated {name}")));
                };
                i += 1;
                let member = member.trim();
                if let Some(attrs) = member.strip_prefix(close) {
                    break collapse_ws(attrs.trim());
                }
                if !member.is_empty() {
                    fields.push(collapse_ws(member));
                }
            };
            nodes.push(Node::Struct(Struct {
                pos,
                name: name.to_string(),
                is_union,
                fields,
                attrs,
            }));
        } else {
            return Err(err(format!("unexpected {line:?}")));
        }
    }
    Ok(Description { nodes })
}

fn keyword<'a>(line: &'a str, kw: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(kw)?;
    rest.starts_with(char::is_whitespace).then(|| rest.trim())
}

fn split_ident(s: &str) -> (&str, &str) {
    let end = s
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '$'))
        .unwrap_or(s.len());
    s.split_at(end)
}

fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split a comma-separated list at nesting depth zero
fn split_list(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut quoted = false;
    let mut cur = String::new();
    for c in s.chars() {
        match c {
            '"' | '\'' => quoted = !quoted,
            '[' | '(' if !quoted => depth += 1,
            ']' | ')' if !quoted => depth -= 1,
            ',' if depth == 0 && !quoted => {
                out.push(collapse_ws(&cur));
                cur.clear();
                continue;
            }
            _ => {}
        }
        cur.push(c);
    }
    out.push(collapse_ws(&cur));
    out.retain(|v| !v.is_empty());
    out
}

fn parse_resource(rest: &str, pos: Pos) -> Result<Resource, String> {
    let (name, after) = split_ident(rest);
    let after = after.trim_start();
    let inner = after
        .strip_prefix('[')
        .ok_or_else(|| format!("bad resource {rest:?}"))?;
    let close = inner
        .find(']')
        .ok_or_else(|| format!("bad resource {rest:?}"))?;
    let base = inner[..close].trim();
    if name.is_empty() || base.is_empty() {
        return Err(format!("bad resource {rest:?}"));
    }
    let tail = inner[close + 1..].trim();
    let values = match tail.strip_prefix(':') {
        Some(values) => split_list(values),
        None if tail.is_empty() => Vec::new(),
        None => return Err(format!("bad resource values {tail:?}")),
    };
    Ok(Resource {
        pos,
        name: name.to_string(),
        base: base.to_string(),
        values,
    })
}

fn parse_call(name: &str, rest: &str, pos: Pos) -> Result<Call, String> {
    let mut depth = 0i32;
    let mut close = None;
    for (idx, c) in rest.char_indices() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => {
                depth -= 1;
                if depth == 0 {
                    close = Some(idx);
                    break;
                }
            }
            _ => {}
        }
    }
    let close = close.ok_or_else(|| format!("unterminated argument list of {name}"))?;
    let call_name = name.split('$').next().unwrap_or(name);
    if call_name.is_empty() {
        return Err(format!("bad call name {name:?}"));
    }
    Ok(Call {
        pos,
        name: name.to_string(),
        call_name: call_name.to_string(),
        args: split_list(&rest[1..close]),
        tail: collapse_ws(&rest[close + 1..]),
    })
}

/// Canonical text of one node
pub fn serialize_node(node: &Node) -> String {
    match node {
        Node::Comment(n) if n.text.is_empty() => "#\n".to_string(),
        Node::Comment(n) => format!("# {}\n", n.text),
        Node::Include(n) => format!("include <{}>\n", n.file),
        Node::IntFlags(n) => format!("{} = {}\n", n.name, n.values.join(", ")),
        Node::Resource(n) if n.values.is_empty() => format!("resource {}[{}]\n", n.name, n.base),
        Node::Resource(n) => format!(
            "resource {}[{}]: {}\n",
            n.name,
            n.base,
            n.values.join(", ")
        ),
        Node::TypeDef(n) if n.body.starts_with('[') => format!("type {}{}\n", n.name, n.body),
        Node::TypeDef(n) => format!("type {} {}\n", n.name, n.body),
        Node::Call(n) => {
            let mut s = format!("{}({})", n.name, n.args.join(", "));
            if !n.tail.is_empty() {
                s.push(' ');
                s.push_str(&n.tail);
            }
            s.push('\n');
            s
        }
        Node::Struct(n) => {
            let (open, close) = if n.is_union { ('[', ']') } else { ('{', '}') };
            let mut s = format!("{} {}\n", n.name, open);
            for field in &n.fields {
                s.push('\t');
                s.push_str(field);
                s.push('\n');
            }
            s.push(close);
            if !n.attrs.is_empty() {
                s.push(' ');
                s.push_str(&n.attrs);
            }
            s.push('\n');
            s
        }
        Node::NewLine(_) => "\n".to_string(),
    }
}

/// Serialize a node sequence into description text
pub fn format(nodes: &[Node]) -> String {
    nodes.iter().map(serialize_node).collect()
}
