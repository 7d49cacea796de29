//! Thread Reconstruction
//!
//! Rebuilds reply trees from a flat, timestamp-ordered message list. Trees
//! come from `in_reply_to` only; `thread_id` plays no part.
//!
//! Two resolutions:
//! - `SinglePass`: a reply attaches only to a parent seen earlier in the
//!   input. A parent that shows up later (or never) leaves the reply as a
//!   root at level 0.
//! - `Backfill`: replies attach to their parent wherever it appears; reply
//!   cycles are broken by promoting the earliest message of the cycle.
//!
//! Construction, traversal and drop are iterative, so deep chains do not
//! overflow the stack. `Clone` and `Serialize` still recurse once per level.

use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::config::ThreadResolution;
use crate::message::Message;

/// A message with its replies and depth from the root
#[derive(Debug, Clone, Serialize)]
pub struct ThreadedMessage {
    #[serde(flatten)]
    pub message: Message,
    pub level: usize,
    pub replies: Vec<ThreadedMessage>,
}

impl ThreadedMessage {
    /// Number of messages in this subtree, excluding the root
    pub fn reply_count(&self) -> usize {
        let mut count = 0;
        let mut stack: Vec<&ThreadedMessage> = vec![self];
        while let Some(node) = stack.pop() {
            count += node.replies.len();
            stack.extend(node.replies.iter());
        }
        count
    }
}

impl Drop for ThreadedMessage {
    fn drop(&mut self) {
        // Detach subtrees onto the heap so dropping never recurses
        let mut stack = std::mem::take(&mut self.replies);
        while let Some(mut node) = stack.pop() {
            stack.append(&mut node.replies);
        }
    }
}

/// Depth-first rendering order: roots in input order, replies in input order
pub fn depth_first(forest: &[ThreadedMessage]) -> Vec<&ThreadedMessage> {
    let mut out = Vec::new();
    let mut stack: Vec<&ThreadedMessage> = forest.iter().rev().collect();
    while let Some(node) = stack.pop() {
        out.push(node);
        stack.extend(node.replies.iter().rev());
    }
    out
}

/// Forest plus what the builder had to work around
#[derive(Debug, Clone, Default, Serialize)]
pub struct ThreadReport {
    pub roots: Vec<ThreadedMessage>,
    /// Replies whose parent is not in the input
    pub orphans: Vec<Uuid>,
    /// Replies whose parent appears at or after them in the input
    pub deferred: Vec<Uuid>,
    /// Self-replies, plus messages on a longer reply cycle (backfill only)
    pub cycles: Vec<Uuid>,
}

/// Builds reply forests
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadBuilder {
    resolution: ThreadResolution,
}

impl ThreadBuilder {
    pub fn new(resolution: ThreadResolution) -> Self {
        Self { resolution }
    }

    pub fn build(&self, messages: Vec<Message>) -> Vec<ThreadedMessage> {
        self.build_report(messages).roots
    }

    pub fn build_report(&self, messages: Vec<Message>) -> ThreadReport {
        let n = messages.len();

        // Index by id; the first occurrence of a duplicate id wins
        let mut index: HashMap<Uuid, usize> = HashMap::with_capacity(n);
        for (i, msg) in messages.iter().enumerate() {
            index.entry(msg.id).or_insert(i);
        }

        let mut report = ThreadReport::default();
        let mut parent: Vec<Option<usize>> = vec![None; n];

        for (i, msg) in messages.iter().enumerate() {
            let Some(parent_id) = msg.in_reply_to else {
                continue;
            };
            match index.get(&parent_id) {
                None => report.orphans.push(msg.id),
                Some(&p) if p == i => report.cycles.push(msg.id),
                Some(&p) if p < i => parent[i] = Some(p),
                Some(&p) => {
                    report.deferred.push(msg.id);
                    if self.resolution == ThreadResolution::Backfill {
                        parent[i] = Some(p);
                    }
                }
            }
        }

        if self.resolution == ThreadResolution::Backfill {
            for member in break_cycles(&mut parent) {
                report.cycles.push(messages[member].id);
            }
        }

        report.roots = assemble(messages, &parent);
        report
    }
}

/// Build with the default single-pass resolution
pub fn build_threads(messages: Vec<Message>) -> Vec<ThreadedMessage> {
    ThreadBuilder::default().build(messages)
}

/// Detach the earliest member of every parent cycle. Returns all members.
fn break_cycles(parent: &mut [Option<usize>]) -> Vec<usize> {
    const UNSEEN: u8 = 0;
    const ON_PATH: u8 = 1;
    const DONE: u8 = 2;

    let mut state = vec![UNSEEN; parent.len()];
    let mut members = Vec::new();

    for start in 0..parent.len() {
        if state[start] != UNSEEN {
            continue;
        }

        let mut path = Vec::new();
        let mut cur = Some(start);
        while let Some(node) = cur {
            match state[node] {
                UNSEEN => {
                    state[node] = ON_PATH;
                    path.push(node);
                    cur = parent[node];
                }
                ON_PATH => {
                    // `node` closes a cycle: everything on the path from it
                    let pos = path.iter().position(|&p| p == node).unwrap_or(0);
                    let cycle = &path[pos..];
                    if let Some(&earliest) = cycle.iter().min() {
                        parent[earliest] = None;
                    }
                    let mut sorted = cycle.to_vec();
                    sorted.sort_unstable();
                    members.extend(sorted);
                    break;
                }
                _ => break,
            }
        }

        for node in path {
            state[node] = DONE;
        }
    }

    members
}

/// Materialize the forest from parent links without recursion
fn assemble(messages: Vec<Message>, parent: &[Option<usize>]) -> Vec<ThreadedMessage> {
    let n = messages.len();

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut roots = Vec::new();
    for (i, p) in parent.iter().enumerate() {
        match p {
            Some(p) => children[*p].push(i),
            None => roots.push(i),
        }
    }

    // Pre-order walk assigns levels
    let mut level = vec![0usize; n];
    let mut preorder = Vec::with_capacity(n);
    let mut stack: Vec<usize> = roots.iter().rev().copied().collect();
    while let Some(node) = stack.pop() {
        preorder.push(node);
        for &child in children[node].iter().rev() {
            level[child] = level[node] + 1;
            stack.push(child);
        }
    }

    // Reverse pre-order builds every subtree before its parent
    let mut slots: Vec<Option<Message>> = messages.into_iter().map(Some).collect();
    let mut built: Vec<Option<ThreadedMessage>> = vec![None; n];
    for &node in preorder.iter().rev() {
        let replies = children[node]
            .iter()
            .filter_map(|&c| built[c].take())
            .collect();
        if let Some(message) = slots[node].take() {
            built[node] = Some(ThreadedMessage {
                message,
                level: level[node],
                replies,
            });
        }
    }

    roots.into_iter().filter_map(|r| built[r].take()).collect()
}
