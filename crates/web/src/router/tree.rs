//! Segment trie behind the [`Router`](super::Router).
//!
//! Each node owns its literal children, at most one parameter child and at most one
//! catch-all leaf. Lookup descends one path segment per level and tries literal, then
//! parameter, then catch-all, backtracking when a more specific branch dead-ends.
//!
//! Parameter names are kept on the leaf, so `/users/:id` and `/users/:name/posts` share the
//! same parameter node while binding different names.

use std::collections::HashMap;

use super::RouterBuildError;

#[derive(Debug)]
pub(crate) struct Tree<T> {
    root: Node<T>,
}

#[derive(Debug)]
struct Node<T> {
    statics: HashMap<String, Node<T>>,
    param: Option<Box<Node<T>>>,
    catch_all: Option<Leaf<T>>,
    leaf: Option<Leaf<T>>,
}

#[derive(Debug)]
struct Leaf<T> {
    names: Vec<String>,
    value: T,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'p> {
    Static(&'p str),
    Param(Option<&'p str>),
    CatchAll(Option<&'p str>),
}

impl<'p> Segment<'p> {
    fn parse(segment: &'p str) -> Self {
        if segment == "**" {
            Segment::CatchAll(None)
        } else if let Some(name) = segment.strip_prefix("**:") {
            Segment::CatchAll(Some(name))
        } else if segment == "*" {
            Segment::Param(None)
        } else if let Some(name) = segment.strip_prefix(':') {
            Segment::Param(Some(name))
        } else {
            Segment::Static(segment)
        }
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

impl<T> Node<T> {
    fn new() -> Self {
        Self { statics: HashMap::new(), param: None, catch_all: None, leaf: None }
    }

    fn search<'t>(&'t self, segments: &[&str], captured: &mut Vec<String>) -> Option<&'t Leaf<T>> {
        let Some((first, rest)) = segments.split_first() else {
            if self.leaf.is_some() {
                return self.leaf.as_ref();
            }
            let catch_all = self.catch_all.as_ref()?;
            captured.push(String::new());
            return Some(catch_all);
        };

        if let Some(leaf) = self.statics.get(*first).and_then(|child| child.search(rest, captured)) {
            return Some(leaf);
        }

        if let Some(child) = &self.param {
            let mark = captured.len();
            captured.push((*first).to_string());
            if let Some(leaf) = child.search(rest, captured) {
                return Some(leaf);
            }
            captured.truncate(mark);
        }

        let catch_all = self.catch_all.as_ref()?;
        captured.push(segments.join("/"));
        Some(catch_all)
    }
}

impl<T> Tree<T> {
    pub(crate) fn new() -> Self {
        Self { root: Node::new() }
    }

    /// Registers `value` under `pattern`.
    ///
    /// Fails when a catch-all is not the last segment, or when a pattern of the same shape
    /// (same literals, parameters at the same places) is registered already.
    pub(crate) fn insert(&mut self, pattern: &str, value: T) -> Result<(), RouterBuildError> {
        let parsed = segments(pattern).map(Segment::parse).collect::<Vec<_>>();

        let mut names = Vec::new();
        let mut unnamed = 0usize;
        let mut node = &mut self.root;

        for (index, segment) in parsed.iter().enumerate() {
            match *segment {
                Segment::Static(literal) => {
                    node = node.statics.entry(literal.to_string()).or_insert_with(Node::new);
                }
                Segment::Param(name) => {
                    names.push(name.map_or_else(
                        || {
                            let name = format!("_{unnamed}");
                            unnamed += 1;
                            name
                        },
                        ToString::to_string,
                    ));
                    node = node.param.get_or_insert_with(|| Box::new(Node::new()));
                }
                Segment::CatchAll(name) => {
                    if index + 1 != parsed.len() {
                        return Err(RouterBuildError::invalid_pattern(pattern, "catch-all must be the last segment"));
                    }
                    if node.catch_all.is_some() {
                        return Err(RouterBuildError::conflict(pattern));
                    }
                    names.push(name.unwrap_or("_").to_string());
                    node.catch_all = Some(Leaf { names, value });
                    return Ok(());
                }
            }
        }

        if node.leaf.is_some() {
            return Err(RouterBuildError::conflict(pattern));
        }
        node.leaf = Some(Leaf { names, value });
        Ok(())
    }

    /// Finds the most specific pattern matching `path` and the parameters it binds.
    pub(crate) fn at(&self, path: &str) -> Option<(&T, Vec<(String, String)>)> {
        let segments = segments(path).collect::<Vec<_>>();
        let mut captured = Vec::with_capacity(segments.len());

        let leaf = self.root.search(&segments, &mut captured)?;
        let params = leaf.names.iter().cloned().zip(captured).collect();
        Some((&leaf.value, params))
    }
}
