//! Segment trie mapping tokenized request targets to route ids.
//!
//! # Responsibilities
//! - Register slash-delimited route templates (`GET/users/:id`)
//! - Resolve a tokenized target to a route id plus captured variables
//!
//! # Design Decisions
//! - Three segment kinds: literal, wildcard (`*`), capture (`:name`)
//! - Siblings are tried in registration order and the first full match wins.
//!   A capture registered before a literal sibling shadows it; precedence is
//!   never derived from specificity.
//! - Matching backtracks into the next sibling when a subtree fails
//! - Captures are only recorded along the successful branch

use serde_json::{Map, Value};

/// Index of a compiled endpoint in the rest node table.
pub type RouteId = usize;

/// Errors raised while registering routes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    /// The full segment sequence is already registered.
    #[error("route already exists: {0}")]
    Duplicate(String),

    /// A route template without any segment.
    #[error("route template has no segments")]
    Empty,
}

/// A single route template segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Matches exactly this text.
    Literal(String),
    /// `*`: matches any single token without recording it.
    Wildcard,
    /// `:name`: matches any single token and records it under `name`.
    Capture(String),
}

impl Segment {
    /// Classify a raw template token.
    pub fn parse(token: &str) -> Self {
        if token == "*" {
            Segment::Wildcard
        } else if let Some(name) = token.strip_prefix(':') {
            Segment::Capture(name.to_string())
        } else {
            Segment::Literal(token.to_string())
        }
    }

    fn accepts(&self, token: &str) -> bool {
        match self {
            Segment::Literal(text) => text == token,
            Segment::Wildcard | Segment::Capture(_) => true,
        }
    }
}

/// Result of a successful match.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteMatch {
    /// Id registered for the matched template.
    pub route_id: RouteId,
    /// Captured `:name` segments, keyed by name.
    pub captures: Map<String, Value>,
}

/// A node of the route trie. The root carries no segment.
#[derive(Debug, Default)]
pub struct RouteNode {
    segment: Option<Segment>,
    route_id: Option<RouteId>,
    children: Vec<RouteNode>,
}

impl RouteNode {
    /// Create an empty trie root.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a template under `route_id`.
    ///
    /// Shared prefixes join existing nodes. Registering a sequence that ends
    /// at a node which already carries an id fails.
    pub fn add_route<S: AsRef<str>>(&mut self, segments: &[S], route_id: RouteId) -> Result<(), RouteError> {
        if segments.is_empty() {
            return Err(RouteError::Empty);
        }
        let template = segments
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join("/");
        self.insert(segments, route_id, &template)
    }

    fn insert<S: AsRef<str>>(&mut self, segments: &[S], route_id: RouteId, template: &str) -> Result<(), RouteError> {
        let Some((first, rest)) = segments.split_first() else {
            if self.route_id.is_some() {
                return Err(RouteError::Duplicate(template.to_string()));
            }
            self.route_id = Some(route_id);
            return Ok(());
        };

        let segment = Segment::parse(first.as_ref());
        let index = match self
            .children
            .iter()
            .position(|child| child.segment.as_ref() == Some(&segment))
        {
            Some(index) => index,
            None => {
                self.children.push(RouteNode {
                    segment: Some(segment),
                    ..Default::default()
                });
                self.children.len() - 1
            }
        };
        self.children[index].insert(rest, route_id, template)
    }

    /// Resolve a tokenized target. `None` means no route matched.
    pub fn match_route<S: AsRef<str>>(&self, tokens: &[S]) -> Option<RouteMatch> {
        let mut captures = Map::new();
        self.find(tokens, &mut captures)
            .map(|route_id| RouteMatch { route_id, captures })
    }

    fn find<S: AsRef<str>>(&self, tokens: &[S], captures: &mut Map<String, Value>) -> Option<RouteId> {
        let Some((token, rest)) = tokens.split_first() else {
            return self.route_id;
        };
        let token = token.as_ref();

        for child in &self.children {
            let Some(segment) = &child.segment else {
                continue;
            };
            if !segment.accepts(token) {
                continue;
            }
            if let Some(route_id) = child.find(rest, captures) {
                if let Segment::Capture(name) = segment {
                    captures.insert(name.clone(), Value::String(token.to_string()));
                }
                return Some(route_id);
            }
        }
        None
    }
}
