//! Hierarchical tree of the entries to place into an image.
//!
//! The flat file and directory lists of the build input are organized into a
//! tree before any allocation happens. Nodes live in a flat arena: each
//! directory holds the indices of its children and every node holds a
//! back-index to its parent, so `.` and `..` entries can be synthesized at
//! encode time without stored edges.

use std::collections::HashMap;

use super::image_error::ImageError;

/// Index of the implicit root directory in every arena.
pub const ROOT: usize = 0;

/// Payload of a tree node.
#[derive(Debug)]
pub enum NodeKind {
    /// A directory with its children in insertion order of first reference.
    Directory { children: Vec<usize> },
    /// A file, referencing the caller's input slice by index.
    File { source: usize, size: u32 },
}

/// One node of the path tree.
#[derive(Debug)]
pub struct TreeNode {
    /// Last path segment of this node. Empty for the root.
    pub name: String,
    /// Arena index of the parent directory. The root is its own parent.
    pub parent: usize,
    pub kind: NodeKind,
}

impl TreeNode {
    pub fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Directory { .. })
    }
}

/// Arena tree of all files and directories of one image.
#[derive(Debug)]
pub struct PathTree {
    nodes: Vec<TreeNode>,
}

impl PathTree {
    /// Builds the tree from flat target lists.
    ///
    /// Explicit empty directories are inserted before the file mappings, and
    /// every missing parent segment becomes a directory node on first
    /// reference. That insertion order is the on-disk directory entry order.
    ///
    /// # Parameters
    /// - `file_targets`: ordered (target path, content length) pairs; the
    ///   position in this list becomes the node's source index
    /// - `dir_targets`: ordered target paths of explicitly empty directories
    ///
    /// # Errors
    /// - `ImageError::PathConflict` on duplicate file targets, on a path
    ///   naming both a file and a directory at the same position, or on an
    ///   empty target path
    pub fn build<S: AsRef<str>>(
        file_targets: &[(S, usize)],
        dir_targets: &[S],
    ) -> Result<PathTree, ImageError> {
        let mut tree = PathTree {
            nodes: vec![TreeNode {
                name: String::new(),
                parent: ROOT,
                kind: NodeKind::Directory { children: vec![] },
            }],
        };

        for dir in dir_targets {
            tree.insert_dir_path(dir.as_ref())?;
        }
        for (source, (target, len)) in file_targets.iter().enumerate() {
            tree.insert_file(target.as_ref(), source, *len)?;
        }

        Ok(tree)
    }

    pub fn node(&self, index: usize) -> &TreeNode {
        &self.nodes[index]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Returns the child indices of a directory node, in entry order.
    pub fn children(&self, index: usize) -> &[usize] {
        match &self.nodes[index].kind {
            NodeKind::Directory { children } => children,
            NodeKind::File { .. } => &[],
        }
    }

    /// Ensures every segment of `path` exists as a directory.
    ///
    /// Re-declaring an existing directory is a no-op; crossing a file is a
    /// conflict.
    fn insert_dir_path(&mut self, path: &str) -> Result<usize, ImageError> {
        let segments = split_path(path)?;
        let mut current = ROOT;
        for segment in &segments {
            current = self.ensure_dir(current, segment, path)?;
        }
        Ok(current)
    }

    /// Inserts one file mapping, creating missing parent directories.
    fn insert_file(&mut self, path: &str, source: usize, len: usize) -> Result<(), ImageError> {
        let segments = split_path(path)?;
        let (file_name, parents) = segments.split_last().expect("split_path returns >= 1");

        let mut current = ROOT;
        for segment in parents {
            current = self.ensure_dir(current, segment, path)?;
        }

        if self.find_child(current, file_name).is_some() {
            return Err(ImageError::PathConflict(format!(
                "`{path}` is already present in the image"
            )));
        }
        let size = u32::try_from(len).map_err(|_| {
            ImageError::CapacityExceeded(format!(
                "`{path}` is {len} bytes long; FAT files are limited to 4 GiB"
            ))
        })?;

        let index = self.push_node(current, file_name, NodeKind::File { source, size });
        debug_assert!(self.nodes[index].parent == current);
        Ok(())
    }

    /// Returns the child of `dir` named `name`, reusing it if it is a
    /// directory and conflicting if it is a file.
    fn ensure_dir(&mut self, dir: usize, name: &str, path: &str) -> Result<usize, ImageError> {
        if let Some(existing) = self.find_child(dir, name) {
            return if self.nodes[existing].is_dir() {
                Ok(existing)
            } else {
                Err(ImageError::PathConflict(format!(
                    "`{path}` crosses `{name}`, which is already a file"
                )))
            };
        }
        Ok(self.push_node(dir, name, NodeKind::Directory { children: vec![] }))
    }

    fn find_child(&self, dir: usize, name: &str) -> Option<usize> {
        self.children(dir)
            .iter()
            .copied()
            .find(|&child| self.nodes[child].name == name)
    }

    fn push_node(&mut self, parent: usize, name: &str, kind: NodeKind) -> usize {
        let index = self.nodes.len();
        self.nodes.push(TreeNode {
            name: name.to_string(),
            parent,
            kind,
        });
        match &mut self.nodes[parent].kind {
            NodeKind::Directory { children } => children.push(index),
            NodeKind::File { .. } => unreachable!("parent is always a directory"),
        }
        index
    }

    /// Counts the nodes of each kind, root excluded.
    pub fn counts(&self) -> (usize, usize) {
        let mut stats = HashMap::new();
        for node in self.nodes.iter().skip(1) {
            *stats.entry(node.is_dir()).or_insert(0usize) += 1;
        }
        (
            stats.get(&false).copied().unwrap_or(0),
            stats.get(&true).copied().unwrap_or(0),
        )
    }
}

/// Splits a target path into its non-empty segments.
fn split_path(path: &str) -> Result<Vec<&str>, ImageError> {
    let segments: Vec<&str> = path
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect();
    if segments.is_empty() {
        return Err(ImageError::PathConflict(format!(
            "`{path}` does not name an entry"
        )));
    }
    if segments.contains(&"..") {
        return Err(ImageError::PathConflict(format!(
            "`{path}` must not contain `..` segments"
        )));
    }
    Ok(segments)
}
