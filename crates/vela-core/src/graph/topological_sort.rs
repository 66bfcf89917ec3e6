// Copyright 2025 eraflo
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

//! Kahn's algorithm, used to turn declared stage dependencies into an
//! execution order.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::hash::Hash;

/// The graph contains at least one cycle.
///
/// `unresolved` lists the nodes that could not be scheduled, in input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleError<T> {
    /// Nodes left with a non-zero in-degree once the queue ran dry.
    pub unresolved: Vec<T>,
}

impl<T: fmt::Debug> fmt::Display for CycleError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dependency cycle between {:?}", self.unresolved)
    }
}

impl<T: fmt::Debug> std::error::Error for CycleError<T> {}

/// Sorts `nodes` so that for every `(before, after)` edge, `before` comes first.
///
/// Nodes that are not ordered relative to each other keep their input order,
/// so the result is deterministic for a given declaration. Edges naming
/// unknown nodes are ignored.
///
/// # Errors
///
/// Returns [`CycleError`] listing the nodes caught in a cycle.
pub fn topological_sort<T>(
    nodes: impl IntoIterator<Item = T>,
    edges: impl IntoIterator<Item = (T, T)>,
) -> Result<Vec<T>, CycleError<T>>
where
    T: Copy + Eq + Hash,
{
    let order: Vec<T> = nodes.into_iter().collect();
    let position: HashMap<T, usize> = order.iter().enumerate().map(|(i, n)| (*n, i)).collect();

    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); order.len()];
    let mut in_degree = vec![0usize; order.len()];
    for (before, after) in edges {
        if let (Some(&b), Some(&a)) = (position.get(&before), position.get(&after)) {
            successors[b].push(a);
            in_degree[a] += 1;
        }
    }

    let mut ready: VecDeque<usize> = (0..order.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut sorted = Vec::with_capacity(order.len());
    while let Some(index) = ready.pop_front() {
        sorted.push(order[index]);
        for &next in &successors[index] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.push_back(next);
            }
        }
    }

    if sorted.len() == order.len() {
        Ok(sorted)
    } else {
        Err(CycleError {
            unresolved: (0..order.len())
                .filter(|&i| in_degree[i] > 0)
                .map(|i| order[i])
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edges_are_respected() {
        let sorted = topological_sort([3, 2, 1], [(1, 2), (2, 3)]).unwrap();
        assert_eq!(sorted, vec![1, 2, 3]);
    }

    #[test]
    fn test_unrelated_nodes_keep_declaration_order() {
        let sorted = topological_sort(['c', 'a', 'b'], std::iter::empty()).unwrap();
        assert_eq!(sorted, vec!['c', 'a', 'b']);
    }

    #[test]
    fn test_cycle_is_reported_with_its_nodes() {
        let err = topological_sort([1, 2, 3], [(1, 2), (2, 3), (3, 2)]).unwrap_err();
        assert_eq!(err.unresolved, vec![2, 3]);
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn test_empty_graph() {
        let sorted: Vec<u8> = topological_sort(Vec::<u8>::new(), Vec::new()).unwrap();
        assert!(sorted.is_empty());
    }
}
