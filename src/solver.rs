//! Type B proof-tree solver.
//!
//! The solver decides whether some residue class of `x₀` modulo `2^k`
//! satisfies every exact-valuation congruence of a pattern together with the
//! closure congruence `x_M ≡ x₀`.  It walks the bits of `x₀` depth first:
//!
//! 1. The root pins `x₀` modulo `2^(a₁+1)` (or `2^k` if that is smaller); the
//!    first step's congruence leaves no freedom below that precision.
//! 2. Each node simulates the pattern with the bits it knows.  A congruence
//!    contradicted by the known bits closes the node as a contradiction leaf.
//! 3. A completed walk is checked for closure on the bits of `x_M` it
//!    determines; a mismatch also closes the node.
//! 4. A node at precision `k` with no contradiction is a surviving leaf: a
//!    ghost class modulo `2^k`.
//! 5. Any other node branches into the `bit = 0` and `bit = 1` extensions,
//!    explored in that order.
//!
//! Nodes live in an arena and the walk uses an explicit stack, so the node
//! cap is checked exactly at every creation.  Exhausting the cap yields
//! [`SearchVerdict::Exhausted`], which is neither UNSAT nor SAT.

use crate::pattern::Pattern;
use crate::residue::{mask, pow2, ResidueConstraint};
use num_bigint::BigUint;
use tracing::{debug, trace};

/// Index of a node inside a [`ProofTree`].
pub type NodeId = usize;

/// Why a branch was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContradictionKind {
    /// The known bits violate the valuation congruence of a step (zero-based).
    ValuationMismatch {
        /// Step whose congruence failed.
        step: usize,
    },
    /// The completed walk does not return to `x₀` on the bits it determines.
    ClosureMismatch,
}

/// Status of a proof-tree node.  Only `Open` nodes are ever updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeStatus {
    /// Created but not yet evaluated, or branched.
    Open,
    /// Terminal leaf refuted by a contradiction.
    Contradiction(ContradictionKind),
    /// Terminal leaf consistent with every constraint at the target precision.
    SurvivingLeaf,
}

/// A residue class of `x₀` under examination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofTreeNode {
    /// Furthest step the walk reached at this node.
    pub step: usize,
    /// Number of known low bits of `x₀`.
    pub precision: u64,
    /// `x₀` modulo `2^precision`.
    pub residue: BigUint,
    /// Parent node, for path reconstruction only.
    pub parent: Option<NodeId>,
    /// Current status.
    pub status: NodeStatus,
}

/// Arena holding every node created by one search.
#[derive(Debug, Clone, Default)]
pub struct ProofTree {
    nodes: Vec<ProofTreeNode>,
}

impl ProofTree {
    fn push(&mut self, precision: u64, residue: BigUint, parent: Option<NodeId>) -> NodeId {
        self.nodes.push(ProofTreeNode {
            step: 0,
            precision,
            residue,
            parent,
            status: NodeStatus::Open,
        });
        self.nodes.len() - 1
    }

    /// Returns the node with the given id.
    pub fn node(&self, id: NodeId) -> Option<&ProofTreeNode> {
        self.nodes.get(id)
    }

    /// Number of nodes in the arena.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// `true` if the arena holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node ids from the root down to `id`.
    pub fn path_to(&self, id: NodeId) -> Vec<NodeId> {
        let mut path = Vec::new();
        let mut cursor = Some(id).filter(|&i| i < self.nodes.len());
        while let Some(current) = cursor {
            path.push(current);
            cursor = self.nodes[current].parent;
        }
        path.reverse();
        path
    }
}

/// Final verdict of a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchVerdict {
    /// Every branch closed by a contradiction at or below the target precision.
    Unsat,
    /// A surviving class modulo `2^k`.
    Sat {
        /// `x₀` modulo `2^k` of the first surviving leaf.
        witness: BigUint,
    },
    /// Node cap reached before a verdict.
    Exhausted,
}

/// Counters collected during a search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchStats {
    /// Nodes created, root included.
    pub nodes_created: u64,
    /// Highest precision reached by an evaluated node.
    pub max_precision: u64,
    /// Leaves closed by a valuation mismatch.
    pub valuation_contradictions: u64,
    /// Leaves closed by a closure mismatch.
    pub closure_contradictions: u64,
    /// Surviving leaves found.
    pub surviving_leaves: u64,
}

/// Verdict, statistics and the explored tree.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// Search verdict.
    pub verdict: SearchVerdict,
    /// Search counters.
    pub stats: SearchStats,
    /// Explored nodes.
    pub tree: ProofTree,
    witness_leaf: Option<NodeId>,
}

impl SearchOutcome {
    /// `(precision, residue)` pairs from the root to the witness leaf.
    pub fn witness_path(&self) -> Vec<(u64, BigUint)> {
        self.witness_leaf
            .map(|leaf| {
                self.tree
                    .path_to(leaf)
                    .into_iter()
                    .filter_map(|id| self.tree.node(id))
                    .map(|node| (node.precision, node.residue.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopAt {
    FirstWitness,
    Exhaustive,
}

enum Walk {
    Contradiction { step: usize },
    Incomplete { step: usize },
    Complete { end: BigUint, bits: u64 },
}

enum NodeEval {
    Closed(ContradictionKind),
    Survives,
    Branch,
}

struct StepConstraint {
    shift: u64,
    congruence: ResidueConstraint,
}

fn step_constraints(pattern: &Pattern) -> Vec<StepConstraint> {
    pattern
        .exponents()
        .iter()
        .map(|&a| StepConstraint {
            shift: u64::from(a),
            congruence: ResidueConstraint::for_exponent(a),
        })
        .collect()
}

/// Runs the odd-step walk on `x₀ mod 2^bits`, losing `aᵢ` bits per step.
fn walk(steps: &[StepConstraint], x0: &BigUint, bits: u64) -> Walk {
    let mut x = mask(x0, bits);
    let mut known = bits;
    for (i, step) in steps.iter().enumerate() {
        if !step.congruence.agrees_with(&x, known) {
            return Walk::Contradiction { step: i };
        }
        if !step.congruence.is_decided(known) {
            return Walk::Incomplete { step: i };
        }
        // The congruence guarantees 2^a divides 3x + 1 on the known bits.
        let numerator = mask(&(&x * 3u32 + 1u32), known);
        x = numerator >> step.shift;
        known -= step.shift;
    }
    Walk::Complete { end: x, bits: known }
}

fn evaluate(steps: &[StepConstraint], node: &mut ProofTreeNode, k: u64) -> NodeEval {
    match walk(steps, &node.residue, node.precision) {
        Walk::Contradiction { step } => {
            node.step = step;
            NodeEval::Closed(ContradictionKind::ValuationMismatch { step })
        }
        Walk::Incomplete { step } => {
            node.step = step;
            if node.precision >= k {
                NodeEval::Survives
            } else {
                NodeEval::Branch
            }
        }
        Walk::Complete { end, bits } => {
            node.step = steps.len();
            let common = bits.min(k);
            if mask(&end, common) != mask(&node.residue, common) {
                NodeEval::Closed(ContradictionKind::ClosureMismatch)
            } else if node.precision >= k {
                NodeEval::Survives
            } else {
                NodeEval::Branch
            }
        }
    }
}

fn run(pattern: &Pattern, k: u32, max_nodes: u64, stop: StopAt) -> (SearchOutcome, Vec<BigUint>) {
    let k = u64::from(k);
    let steps = step_constraints(pattern);
    let mut tree = ProofTree::default();
    let mut stats = SearchStats::default();
    let mut witnesses = Vec::new();
    let mut witness_leaf = None;

    let exhausted = |tree: ProofTree, stats: SearchStats, witnesses: Vec<BigUint>| {
        debug!(
            pattern = %pattern,
            k,
            max_nodes,
            nodes = stats.nodes_created,
            "node cap exhausted"
        );
        (
            SearchOutcome {
                verdict: SearchVerdict::Exhausted,
                stats,
                tree,
                witness_leaf: None,
            },
            witnesses,
        )
    };

    if max_nodes == 0 || steps.is_empty() {
        return exhausted(tree, stats, witnesses);
    }
    let first = &steps[0].congruence;
    let start_bits = first.bits().min(k);
    let root = tree.push(start_bits, mask(first.residue(), start_bits), None);
    stats.nodes_created = 1;
    let mut stack = vec![root];

    while let Some(id) = stack.pop() {
        let node = &mut tree.nodes[id];
        stats.max_precision = stats.max_precision.max(node.precision);
        match evaluate(&steps, node, k) {
            NodeEval::Closed(kind) => {
                node.status = NodeStatus::Contradiction(kind);
                match kind {
                    ContradictionKind::ValuationMismatch { .. } => {
                        stats.valuation_contradictions += 1
                    }
                    ContradictionKind::ClosureMismatch => stats.closure_contradictions += 1,
                }
            }
            NodeEval::Survives => {
                node.status = NodeStatus::SurvivingLeaf;
                stats.surviving_leaves += 1;
                witnesses.push(node.residue.clone());
                witness_leaf.get_or_insert(id);
                if stop == StopAt::FirstWitness {
                    break;
                }
            }
            NodeEval::Branch => {
                let precision = node.precision;
                let low = node.residue.clone();
                let high = &low + pow2(precision);
                let mut children = [0 as NodeId; 2];
                for (slot, residue) in children.iter_mut().zip([low, high]) {
                    if stats.nodes_created >= max_nodes {
                        return exhausted(tree, stats, witnesses);
                    }
                    *slot = tree.push(precision + 1, residue, Some(id));
                    stats.nodes_created += 1;
                }
                trace!(node = id, precision, "branch");
                stack.push(children[1]);
                stack.push(children[0]);
            }
        }
    }

    let verdict = match witnesses.first() {
        Some(witness) => SearchVerdict::Sat {
            witness: witness.clone(),
        },
        None => SearchVerdict::Unsat,
    };
    debug!(
        pattern = %pattern,
        k,
        nodes = stats.nodes_created,
        sat = matches!(verdict, SearchVerdict::Sat { .. }),
        "type B search finished"
    );
    (
        SearchOutcome {
            verdict,
            stats,
            tree,
            witness_leaf,
        },
        witnesses,
    )
}

/// Searches for the first class modulo `2^k` satisfying every constraint.
pub fn search(pattern: &Pattern, k: u32, max_nodes: u64) -> SearchOutcome {
    run(pattern, k, max_nodes, StopAt::FirstWitness).0
}

/// Visits every branch and returns all surviving classes in exploration order.
///
/// Returns `None` when the node cap is exhausted first.
pub fn enumerate_ghosts(pattern: &Pattern, k: u32, max_nodes: u64) -> Option<Vec<BigUint>> {
    let (outcome, witnesses) = run(pattern, k, max_nodes, StopAt::Exhaustive);
    match outcome.verdict {
        SearchVerdict::Exhausted => None,
        _ => Some(witnesses),
    }
}
