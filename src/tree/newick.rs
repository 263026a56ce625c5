// src/tree/newick.rs

use ahash::AHashSet;
use anyhow::{Context, Result, anyhow, bail};
use newick::{Newick, NodeID, one_from_string};
use smallvec::SmallVec;

use super::{Edge, Node, Tree};

type NwkTree = newick::NewickTree;

/// Everything jplace attaches to a node apart from its place in the topology.
#[derive(Debug, Default, Clone, PartialEq)]
struct NodeAttrs {
    name: String,
    length: Option<f64>,
    edge_num: Option<i64>,
}

/// Skips whitespace and `[...]` comments.
fn skip_blank(s: &str, mut i: usize) -> Result<usize> {
    let bytes = s.as_bytes();
    loop {
        match bytes.get(i).copied() {
            Some(c) if c.is_ascii_whitespace() => i += 1,
            Some(b'[') => {
                let start = i;
                i = scan(s, i + 1, |c| c != b']');
                if i >= bytes.len() {
                    bail!("unterminated comment at byte {start}");
                }
                i += 1;
            }
            _ => return Ok(i),
        }
    }
}

/// First index at or after `i` whose byte fails `keep`.
fn scan(s: &str, mut i: usize, keep: impl Fn(u8) -> bool) -> usize {
    let bytes = s.as_bytes();
    while bytes.get(i).is_some_and(|&c| keep(c)) {
        i += 1;
    }
    i
}

#[inline]
fn is_label_byte(c: u8) -> bool {
    !matches!(c, b':' | b',' | b'(' | b')' | b';' | b'[' | b'{' | b'\'')
        && !c.is_ascii_whitespace()
}

#[inline]
fn is_number_byte(c: u8) -> bool {
    c.is_ascii_digit() || matches!(c, b'.' | b'-' | b'+' | b'e' | b'E')
}

/// `'...'` label starting at `i`, with `''` as an escaped quote.
fn quoted_label(s: &str, i: usize) -> Result<(String, usize)> {
    let bytes = s.as_bytes();
    let mut out = Vec::new();
    let mut j = i + 1;
    loop {
        match bytes.get(j).copied() {
            None => bail!("unterminated quoted label at byte {i}"),
            Some(b'\'') if bytes.get(j + 1) == Some(&b'\'') => {
                out.push(b'\'');
                j += 2;
            }
            Some(b'\'') => break,
            Some(c) => {
                out.push(c);
                j += 1;
            }
        }
    }
    let name = String::from_utf8(out).with_context(|| format!("label at byte {i} is not utf-8"))?;
    Ok((name, j + 1))
}

/// Reads `label`, `:length` and `{edge_num}` at `i`, in any order after the label.
fn read_node(s: &str, i: usize, out: &mut String, attrs: &mut Vec<NodeAttrs>) -> Result<usize> {
    let mut node = NodeAttrs::default();
    let mut i = skip_blank(s, i)?;
    if s.as_bytes().get(i) == Some(&b'\'') {
        let (name, next) = quoted_label(s, i)?;
        node.name = name;
        i = next;
    } else {
        // delimiters are ASCII, so these indices stay on char boundaries
        let end = scan(s, i, is_label_byte);
        node.name = s[i..end].to_string();
        i = end;
    }

    loop {
        i = skip_blank(s, i)?;
        match s.as_bytes().get(i).copied() {
            Some(b':') => {
                let start = skip_blank(s, i + 1)?;
                let end = scan(s, start, is_number_byte);
                let raw = &s[start..end];
                let len: f64 = raw
                    .parse()
                    .with_context(|| format!("bad branch length {raw:?} at byte {start}"))?;
                node.length = Some(len);
                i = end;
            }
            Some(b'{') => {
                let start = i + 1;
                let end = scan(s, start, |c| c != b'}');
                if end >= s.len() {
                    bail!("unterminated edge number at byte {start}");
                }
                let raw = &s[start..end];
                let num: i64 = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("bad edge number {raw:?} at byte {start}"))?;
                node.edge_num = Some(num);
                i = end + 1;
            }
            _ => break,
        }
    }

    out.push('n');
    out.push_str(&attrs.len().to_string());
    attrs.push(node);
    Ok(i)
}

/// Rewrites a jplace Newick string so that every node carries the plain label
/// `n{k}`, `k` indexing the returned attributes.
///
/// Comments, quoted labels, lengths and `{edge_num}` annotations are consumed
/// here and the newick crate only sees the topology. Lengths stay on this side
/// because the crate keeps them as `f32`.
fn sanitize_jplace_newick(s: &str) -> Result<(String, Vec<NodeAttrs>)> {
    let mut out = String::with_capacity(s.len());
    let mut attrs = Vec::new();
    let mut depth = 0usize;
    let mut expect_node = true;
    let mut i = 0usize;

    loop {
        i = skip_blank(s, i)?;
        match s.as_bytes().get(i).copied() {
            Some(b'(') if expect_node => {
                out.push('(');
                depth += 1;
                i += 1;
            }
            _ if expect_node => {
                i = read_node(s, i, &mut out, &mut attrs)?;
                expect_node = false;
            }
            Some(b',') => {
                if depth == 0 {
                    bail!("unexpected ',' at top level (byte {i})");
                }
                out.push(',');
                i += 1;
                expect_node = true;
            }
            Some(b')') => {
                if depth == 0 {
                    bail!("unbalanced ')' at byte {i}");
                }
                depth -= 1;
                out.push(')');
                i = read_node(s, i + 1, &mut out, &mut attrs)?;
            }
            Some(b';') | None => {
                if depth > 0 {
                    bail!("unbalanced parentheses: {depth} group(s) left open");
                }
                if i < s.len() {
                    i += 1;
                }
                break;
            }
            Some(c) => bail!("unexpected character {:?} at byte {i}", c as char),
        }
    }

    i = skip_blank(s, i)?;
    if i < s.len() {
        bail!("trailing data after ';' at byte {i}");
    }
    out.push(';');
    Ok((out, attrs))
}

fn placeholder(t: &NwkTree, n: NodeID) -> Result<usize> {
    t.name(n)
        .and_then(|label| label.strip_prefix('n'))
        .and_then(|k| k.parse().ok())
        .ok_or_else(|| anyhow!("parsed node {n} has no placeholder label"))
}

/// Lays the parsed tree out in preorder, so edge `e` leads to node `e + 1`.
fn build_preorder(t: &NwkTree, mut attrs: Vec<NodeAttrs>) -> Result<Tree> {
    let mut nodes: Vec<Node> = Vec::with_capacity(attrs.len());
    let mut edges: Vec<Edge> = Vec::with_capacity(attrs.len().saturating_sub(1));
    let mut explicit_num: Vec<bool> = Vec::with_capacity(edges.capacity());

    let mut stack: Vec<(NodeID, Option<usize>)> = vec![(t.root(), None)];
    while let Some((id, parent)) = stack.pop() {
        let k = placeholder(t, id)?;
        let a = attrs
            .get_mut(k)
            .map(std::mem::take)
            .ok_or_else(|| anyhow!("placeholder n{k} out of range"))?;
        let idx = nodes.len();
        let parent_edge = match parent {
            Some(p) => {
                let e = edges.len();
                edges.push(Edge {
                    primary: p,
                    secondary: idx,
                    branch_length: a.length.unwrap_or(0.0),
                    edge_num: a.edge_num.unwrap_or(e as i64),
                });
                explicit_num.push(a.edge_num.is_some());
                nodes[p].child_edges.push(e);
                Some(e)
            }
            None => None,
        };
        nodes.push(Node {
            name: a.name,
            parent_edge,
            child_edges: SmallVec::new(),
        });
        for &c in t[id].children().iter().rev() {
            stack.push((c, Some(idx)));
        }
    }

    // Annotated numbers are authoritative; they must not collide.
    let mut seen = AHashSet::with_capacity(edges.len());
    for (e, edge) in edges.iter().enumerate() {
        if !seen.insert(edge.edge_num) {
            bail!(
                "duplicate edge number {} (edge {e}, {})",
                edge.edge_num,
                if explicit_num[e] { "annotated" } else { "implicit" }
            );
        }
    }

    Ok(Tree::from_parts(nodes, edges))
}

/// Parses a jplace Newick string into a [`Tree`].
///
/// Edges without a `{n}` annotation are numbered by their edge index. A `{n}`
/// on the root is ignored.
pub fn parse_newick(input: &str) -> Result<Tree> {
    let (sanitized, attrs) = sanitize_jplace_newick(input)?;
    let parsed: NwkTree = one_from_string(&sanitized).context("parse newick (sanitized)")?;
    build_preorder(&parsed, attrs)
}
