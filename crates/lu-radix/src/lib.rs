//! lu-radix: Zero-dependency prefix tree for path lookup
//!
//! Stores values against slash-separated paths and answers two questions:
//! which value sits at exactly this path, and which stored path is the
//! longest prefix of this path.
//!
//! ## Features
//! - O(k) lookup where k = number of path segments
//! - Case-insensitive segments: `/API/Users` and `/api/users` are the same key
//! - Segment-aware prefixes: `/api` is a prefix of `/api/users`, not of `/apiary`
//! - Empty segments are ignored: `/a//b/` and `a/b` address the same node
//! - Zero external dependencies
//!
//! ## Example
//! ```
//! use lu_radix::Tree;
//!
//! let mut tree = Tree::new();
//! tree.insert("/static", "public");
//! tree.insert("/static/img", "images");
//!
//! assert_eq!(tree.get("/STATIC"), Some(&"public"));
//!
//! let (prefix, value) = tree.prefix("/static/img/logo.png").unwrap();
//! assert_eq!(prefix, "/static/img");
//! assert_eq!(*value, "images");
//! ```

use std::collections::HashMap;

/// Trie node keyed by lower-cased path segment
#[derive(Debug)]
struct Node<T> {
    children: HashMap<String, Node<T>>,
    value: Option<T>,
}

impl<T> Default for Node<T> {
    fn default() -> Self {
        Self {
            children: HashMap::new(),
            value: None,
        }
    }
}

/// Case-insensitive path tree with exact and longest-prefix lookup.
///
/// Keys are compared segment by segment and empty segments are skipped, so
/// `/a//b`, `a/b/` and `/A/B` all address the value stored at `/a/b`.
#[derive(Debug)]
pub struct Tree<T> {
    root: Node<T>,
    len: usize,
}

impl<T> Default for Tree<T> {
    fn default() -> Self {
        Self {
            root: Node::default(),
            len: 0,
        }
    }
}

impl<T> Tree<T> {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` at `path`, replacing any existing value there.
    ///
    /// Returns a mutable reference to the stored value.
    ///
    /// # Example
    /// ```
    /// use lu_radix::Tree;
    ///
    /// let mut tree = Tree::new();
    /// tree.insert("/users", 1);
    /// *tree.insert("/users", 2) += 1;
    /// assert_eq!(tree.get("/users"), Some(&3));
    /// assert_eq!(tree.len(), 1);
    /// ```
    pub fn insert(&mut self, path: &str, value: T) -> &mut T {
        let node = Self::descend(&mut self.root, path);
        if node.value.is_none() {
            self.len += 1;
        }
        node.value.insert(value)
    }

    /// Return the value at `path`, inserting the result of `f` first if the
    /// path holds nothing yet
    pub fn get_or_insert_with<F>(&mut self, path: &str, f: F) -> &mut T
    where
        F: FnOnce() -> T,
    {
        let node = Self::descend(&mut self.root, path);
        if node.value.is_none() {
            self.len += 1;
        }
        node.value.get_or_insert_with(f)
    }

    /// Exact-match lookup
    pub fn get(&self, path: &str) -> Option<&T> {
        let mut node = &self.root;
        for segment in segments(path) {
            node = node.children.get(&segment)?;
        }
        node.value.as_ref()
    }

    /// Exact-match lookup returning a mutable reference
    pub fn get_mut(&mut self, path: &str) -> Option<&mut T> {
        let mut node = &mut self.root;
        for segment in segments(path) {
            node = node.children.get_mut(&segment)?;
        }
        node.value.as_mut()
    }

    /// Find the longest stored path that is a prefix of `path`.
    ///
    /// Returns the matched prefix in its normalized form (leading slash,
    /// lower-cased segments) together with its value. The root path `/`
    /// is a prefix of every path.
    ///
    /// # Example
    /// ```
    /// use lu_radix::Tree;
    ///
    /// let mut tree = Tree::new();
    /// tree.insert("/api", 'a');
    ///
    /// assert_eq!(tree.prefix("/Api/v1").map(|(p, v)| (p, *v)), Some(("/api".to_string(), 'a')));
    /// assert!(tree.prefix("/apiary").is_none());
    /// ```
    pub fn prefix(&self, path: &str) -> Option<(String, &T)> {
        let mut node = &self.root;
        let mut walked: Vec<String> = Vec::new();
        let mut best = node.value.as_ref().map(|value| (0, value));

        for segment in segments(path) {
            match node.children.get(&segment) {
                Some(child) => {
                    node = child;
                    walked.push(segment);
                    if let Some(value) = node.value.as_ref() {
                        best = Some((walked.len(), value));
                    }
                }
                None => break,
            }
        }

        best.map(|(depth, value)| (format!("/{}", walked[..depth].join("/")), value))
    }

    /// Number of stored values
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the tree holds no values
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn descend<'a>(mut node: &'a mut Node<T>, path: &str) -> &'a mut Node<T> {
        for segment in segments(path) {
            node = node.children.entry(segment).or_default();
        }
        node
    }
}

/// Split a path into its non-empty, lower-cased segments
fn segments(path: &str) -> impl Iterator<Item = String> + '_ {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
}
