use std::{
    collections::{BTreeMap, btree_map},
    fmt::{self, Display},
};

use ndarray::{ArrayD, IxDyn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{BenchErr, Result};

/// The dimensions of a single tensor leaf.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShapeTuple(Vec<usize>);

impl ShapeTuple {
    /// Creates a new `ShapeTuple`.
    ///
    /// # Arguments
    /// * `dims` - The size of each axis.
    ///
    /// # Returns
    /// A new `ShapeTuple` instance.
    pub fn new<I>(dims: I) -> Self
    where
        I: IntoIterator<Item = usize>,
    {
        Self(dims.into_iter().collect())
    }

    /// The number of axes.
    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// The number of elements a tensor of this shape holds.
    pub fn numel(&self) -> usize {
        self.0.iter().product()
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }
}

impl Display for ShapeTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

/// Leaf path to shape, in the same order the leaves of a `TensorTree` iterate.
pub type ShapeTree = BTreeMap<String, ShapeTuple>;

/// A tree-shaped collection of tensors keyed by their `/`-separated path.
///
/// Parameters, gradients, optimizer buffers and auxiliary model state are all `TensorTree`s.
/// Values are threaded by replacement: the operations below return new trees and never mutate
/// their inputs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TensorTree {
    leaves: BTreeMap<String, ArrayD<f32>>,
}

impl TensorTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a tree of zeros with the given shapes.
    ///
    /// # Arguments
    /// * `shapes` - The shape of each leaf.
    ///
    /// # Returns
    /// A new `TensorTree` instance.
    pub fn zeros(shapes: &ShapeTree) -> Self {
        let leaves = shapes
            .iter()
            .map(|(path, shape)| (path.clone(), ArrayD::zeros(IxDyn(shape.dims()))))
            .collect();

        Self { leaves }
    }

    /// Inserts a leaf, replacing any previous tensor under the same path.
    pub fn insert<S: Into<String>>(&mut self, path: S, tensor: ArrayD<f32>) {
        self.leaves.insert(path.into(), tensor);
    }

    pub fn get(&self, path: &str) -> Option<&ArrayD<f32>> {
        self.leaves.get(path)
    }

    /// Returns the leaf under `path` or a `TreeMismatch` error naming `what` was being read.
    pub fn leaf(&self, what: &'static str, path: &str) -> Result<&ArrayD<f32>> {
        self.leaves.get(path).ok_or_else(|| BenchErr::TreeMismatch {
            what,
            path: path.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, ArrayD<f32>> {
        self.leaves.iter()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.leaves.keys().map(String::as_str)
    }

    /// The total amount of scalars in the tree.
    pub fn numel(&self) -> usize {
        self.leaves.values().map(|t| t.len()).sum()
    }

    /// Returns the shape of every leaf.
    pub fn shapes(&self) -> ShapeTree {
        self.leaves
            .iter()
            .map(|(path, t)| (path.clone(), ShapeTuple::new(t.shape().iter().copied())))
            .collect()
    }

    /// Verifies that this tree has exactly the leaves and shapes of `expected`.
    ///
    /// # Arguments
    /// * `what` - What this tree represents, used in the error.
    /// * `expected` - The declared shapes.
    ///
    /// # Returns
    /// A `TreeMismatch` or `ShapeMismatch` error on the first disagreement.
    pub fn check_shapes(&self, what: &'static str, expected: &ShapeTree) -> Result<()> {
        if let Some(extra) = self.leaves.keys().find(|p| !expected.contains_key(*p)) {
            return Err(BenchErr::TreeMismatch {
                what,
                path: extra.clone(),
            });
        }

        for (path, shape) in expected {
            let leaf = self.leaf(what, path)?;
            if leaf.shape() != shape.dims() {
                return Err(BenchErr::ShapeMismatch {
                    what,
                    path: path.clone(),
                    got: ShapeTuple::new(leaf.shape().iter().copied()),
                    expected: shape.clone(),
                });
            }
        }

        Ok(())
    }

    /// Applies `f` to every leaf.
    pub fn map<F>(&self, f: F) -> Self
    where
        F: Fn(&str, &ArrayD<f32>) -> ArrayD<f32> + Sync,
    {
        let leaves = self
            .leaves
            .par_iter()
            .map(|(path, t)| (path.clone(), f(path, t)))
            .collect();

        Self { leaves }
    }

    /// Applies `f` to every pair of leaves sharing a path.
    ///
    /// # Arguments
    /// * `other` - A tree with the same structure and shapes.
    /// * `f` - The leaf-wise combinator.
    ///
    /// # Returns
    /// The combined tree or an error if the structures disagree.
    pub fn zip_map<F>(&self, other: &Self, f: F) -> Result<Self>
    where
        F: Fn(&str, &ArrayD<f32>, &ArrayD<f32>) -> ArrayD<f32> + Sync,
    {
        other.check_shapes("zipped tree", &self.shapes())?;

        let leaves = self
            .leaves
            .par_iter()
            .map(|(path, a)| (path.clone(), f(path, a, &other.leaves[path])))
            .collect();

        Ok(Self { leaves })
    }

    /// Adds `updates` to this tree leaf by leaf.
    pub fn apply_updates(&self, updates: &Self) -> Result<Self> {
        self.zip_map(updates, |_, p, u| p + u)
    }

    /// Scales every leaf by `factor`.
    pub fn scale(&self, factor: f32) -> Self {
        self.map(|_, t| t * factor)
    }
}

impl FromIterator<(String, ArrayD<f32>)> for TensorTree {
    fn from_iter<I: IntoIterator<Item = (String, ArrayD<f32>)>>(iter: I) -> Self {
        Self {
            leaves: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a TensorTree {
    type Item = (&'a String, &'a ArrayD<f32>);
    type IntoIter = btree_map::Iter<'a, String, ArrayD<f32>>;

    fn into_iter(self) -> Self::IntoIter {
        self.leaves.iter()
    }
}

#[cfg(test)]
mod tests {
    use ndarray::arr1;

    use super::*;

    fn tree(values: &[(&str, Vec<f32>)]) -> TensorTree {
        values
            .iter()
            .map(|(p, v)| (p.to_string(), arr1(v).into_dyn()))
            .collect()
    }

    #[test]
    fn zeros_follow_shapes() {
        let mut shapes = ShapeTree::new();
        shapes.insert("dense/kernel".into(), ShapeTuple::new([2, 3]));
        shapes.insert("dense/bias".into(), ShapeTuple::new([3]));

        let t = TensorTree::zeros(&shapes);
        assert_eq!(t.shapes(), shapes);
        assert_eq!(t.numel(), 9);
        assert!(t.iter().all(|(_, l)| l.iter().all(|&x| x == 0.)));
    }

    #[test]
    fn check_shapes_reports_missing_and_extra_leaves() {
        let a = tree(&[("a", vec![1., 2.]), ("b", vec![3.])]);
        let b = tree(&[("a", vec![1., 2.])]);

        assert!(matches!(
            b.check_shapes("params", &a.shapes()),
            Err(BenchErr::TreeMismatch { path, .. }) if path == "b"
        ));
        assert!(matches!(
            a.check_shapes("params", &b.shapes()),
            Err(BenchErr::TreeMismatch { path, .. }) if path == "b"
        ));
    }

    #[test]
    fn check_shapes_reports_wrong_shape() {
        let a = tree(&[("a", vec![1., 2.])]);
        let b = tree(&[("a", vec![1., 2., 3.])]);

        let err = b.check_shapes("grads", &a.shapes()).unwrap_err();
        assert!(matches!(err, BenchErr::ShapeMismatch { what: "grads", .. }));
    }

    #[test]
    fn apply_updates_adds_leafwise() {
        let params = tree(&[("w", vec![1., 2.]), ("b", vec![0.5])]);
        let updates = tree(&[("w", vec![-1., 1.]), ("b", vec![0.5])]);

        let out = params.apply_updates(&updates).unwrap();
        assert_eq!(out, tree(&[("w", vec![0., 3.]), ("b", vec![1.])]));
        // inputs are untouched
        assert_eq!(params, tree(&[("w", vec![1., 2.]), ("b", vec![0.5])]));
    }
}
