//! Graph inference over stored labels.
//!
//! Content items (or subtopics) are vertices and positive labels are edges.
//! This module derives what the stored edges imply:
//!
//! - [`LabelStore::connected_component`]: every positive label reachable from
//!   a vertex, discovered breadth-first
//! - [`LabelStore::expand`]: the component rendered as a complete graph, with
//!   missing edges synthesized
//! - [`LabelStore::negative_inference`] / [`LabelStore::negative_label_inference`]:
//!   "a differs from b, so a differs from everything b is the same as"
//!
//! All traversals read through [`LabelStore::directly_connected`] and never
//! write. Memory use is proportional to the components touched.

use std::collections::{BTreeSet, VecDeque};

use ahash::AHashSet;
use coref_label::{normalize_pair, CorefValue, Ident, Label, LabelError};

use crate::error::Result;
use crate::kv::OrderedKv;
use crate::store::{DirectlyConnected, LabelStore};

/// Annotator recorded on labels produced by negative inference.
pub const AUTO_ANNOTATOR: &str = "auto";

impl<K: OrderedKv> LabelStore<K> {
    /// Positive labels in the component containing `ident`, each yielded
    /// once, lazily. With a subtopic ident, vertices are `(content_id,
    /// subtopic_id)` pairs; otherwise subtopics are ignored.
    ///
    /// The iterator owns its traversal state and cannot be restarted.
    pub fn connected_component(&self, ident: impl Into<Ident>) -> ConnectedComponent<'_, K> {
        ConnectedComponent::new(self, ident.into())
    }

    /// The component of `ident` plus a synthesized positive label for every
    /// pair of its vertices that no stored label joins.
    ///
    /// Stored labels come first, unchanged. Synthesized labels take their
    /// annotator from the first stored one and are emitted in sorted vertex
    /// order.
    pub fn expand(&self, ident: impl Into<Ident>) -> Result<Vec<Label>> {
        let seed = ident.into();
        let subtopic_aware = seed.has_subtopic();
        let mut labels = self
            .connected_component(seed)
            .collect::<Result<Vec<_>>>()?;
        let Some(annotator) = labels.first().map(|l| l.annotator_id().to_string()) else {
            return Ok(labels);
        };

        let mut vertices: BTreeSet<Ident> = BTreeSet::new();
        let mut backed: AHashSet<(Ident, Ident)> = AHashSet::new();
        for label in &labels {
            let (a, b) = label.endpoints(subtopic_aware);
            backed.insert(normalize_pair(a.clone(), b.clone()));
            vertices.insert(a);
            vertices.insert(b);
        }

        let vertices: Vec<Ident> = vertices.into_iter().collect();
        let mut synthesized = Vec::new();
        for (i, v1) in vertices.iter().enumerate() {
            for v2 in vertices.iter().skip(i + 1) {
                // `vertices` is sorted, so (v1, v2) is already normalized.
                if backed.contains(&(v1.clone(), v2.clone())) {
                    continue;
                }
                synthesized.push(synthetic_positive(v1, v2, &annotator));
            }
        }
        tracing::debug!(
            literal = labels.len(),
            synthesized = synthesized.len(),
            vertices = vertices.len(),
            "expanded component"
        );
        labels.extend(synthesized);
        Ok(labels)
    }

    /// For every negative label touching `content_id`, the results of
    /// [`LabelStore::negative_label_inference`].
    pub fn negative_inference(&self, content_id: &str) -> NegativeInference<'_, K> {
        NegativeInference {
            store: self,
            negatives: self.directly_connected(content_id),
            current: None,
        }
    }

    /// Given a negative label `(a, b)`: the label itself, then `(a, x)` for
    /// every `x` in the positive component of `b`, then `(b, y)` for every `y`
    /// in the component of `a`. Inferred labels are whole-item, annotated
    /// [`AUTO_ANNOTATOR`], and each is yielded once.
    ///
    /// Fails with an invariant violation if `label` is not negative.
    pub fn negative_label_inference(&self, label: &Label) -> Result<NegativeLabelInference<'_, K>> {
        if !label.is_negative() {
            return Err(LabelError::InvariantViolation(format!(
                "negative inference needs a negative label, got {label}"
            ))
            .into());
        }
        Ok(NegativeLabelInference::new(self, label.clone()))
    }
}

fn synthetic_positive(v1: &Ident, v2: &Ident, annotator: &str) -> Label {
    Label::new(
        v1.content_id(),
        v2.content_id(),
        annotator,
        CorefValue::Positive,
    )
    .with_subtopics(
        v1.subtopic_id().unwrap_or_default(),
        v2.subtopic_id().unwrap_or_default(),
    )
}

// ============================================================================
// Connected components
// ============================================================================

/// Breadth-first walk over positive labels. See
/// [`LabelStore::connected_component`].
pub struct ConnectedComponent<'a, K: OrderedKv> {
    store: &'a LabelStore<K>,
    subtopic_aware: bool,
    /// Vertices visited or already queued.
    done: AHashSet<Ident>,
    todo: VecDeque<Ident>,
    yielded: AHashSet<Label>,
    neighbors: Option<DirectlyConnected<'a, K>>,
}

impl<'a, K: OrderedKv> ConnectedComponent<'a, K> {
    fn new(store: &'a LabelStore<K>, seed: Ident) -> Self {
        let subtopic_aware = seed.has_subtopic();
        let mut done = AHashSet::new();
        done.insert(seed.clone());
        Self {
            store,
            subtopic_aware,
            done,
            todo: VecDeque::from([seed]),
            yielded: AHashSet::new(),
            neighbors: None,
        }
    }
}

impl<K: OrderedKv> Iterator for ConnectedComponent<'_, K> {
    type Item = Result<Label>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let step = match self.neighbors.as_mut() {
                Some(neighbors) => neighbors.next(),
                None => {
                    let ident = self.todo.pop_front()?;
                    tracing::trace!(%ident, "visiting");
                    self.neighbors = Some(self.store.directly_connected(ident));
                    continue;
                }
            };
            match step {
                None => self.neighbors = None,
                Some(Err(e)) => {
                    self.neighbors = None;
                    self.todo.clear();
                    return Some(Err(e));
                }
                Some(Ok(label)) => {
                    if !label.is_positive() {
                        continue;
                    }
                    let (a, b) = label.endpoints(self.subtopic_aware);
                    for vertex in [a, b] {
                        if !self.done.contains(&vertex) {
                            self.done.insert(vertex.clone());
                            self.todo.push_back(vertex);
                        }
                    }
                    if self.yielded.insert(label.clone()) {
                        return Some(Ok(label));
                    }
                }
            }
        }
    }
}

// ============================================================================
// Negative inference
// ============================================================================

enum Stage<'a, K: OrderedKv> {
    Seed,
    /// Walking the component of `far`, pairing each vertex with `anchor`.
    Component {
        anchor: String,
        far: String,
        walk: ConnectedComponent<'a, K>,
        last: bool,
    },
    Done,
}

/// See [`LabelStore::negative_label_inference`].
pub struct NegativeLabelInference<'a, K: OrderedKv> {
    store: &'a LabelStore<K>,
    label: Label,
    stage: Stage<'a, K>,
    pending: VecDeque<Label>,
    seen: AHashSet<Label>,
}

impl<'a, K: OrderedKv> NegativeLabelInference<'a, K> {
    fn new(store: &'a LabelStore<K>, label: Label) -> Self {
        Self {
            store,
            label,
            stage: Stage::Seed,
            pending: VecDeque::new(),
            seen: AHashSet::new(),
        }
    }

    fn walk_from(&self, anchor: &str, far: &str, last: bool) -> Stage<'a, K> {
        Stage::Component {
            anchor: anchor.to_string(),
            far: far.to_string(),
            walk: self.store.connected_component(far),
            last,
        }
    }
}

impl<K: OrderedKv> NegativeLabelInference<'_, K> {
    /// Queue `(anchor, x)` for each side `x` of `member` that is neither
    /// endpoint of the seed label.
    fn infer_from(&mut self, member: &Label) {
        let Stage::Component { anchor, far, .. } = &self.stage else {
            return;
        };
        for cid in [member.content_id1(), member.content_id2()] {
            if cid == far.as_str() || cid == anchor.as_str() {
                continue;
            }
            let inferred = Label::new(anchor.as_str(), cid, AUTO_ANNOTATOR, CorefValue::Negative);
            if self.seen.insert(inferred.clone()) {
                self.pending.push_back(inferred);
            }
        }
    }
}

impl<K: OrderedKv> Iterator for NegativeLabelInference<'_, K> {
    type Item = Result<Label>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(label) = self.pending.pop_front() {
                return Some(Ok(label));
            }
            let step = match &mut self.stage {
                Stage::Done => return None,
                Stage::Seed => None,
                Stage::Component { walk, .. } => Some(walk.next()),
            };
            match step {
                None => {
                    let (a, b) = (self.label.content_id1(), self.label.content_id2());
                    self.stage = self.walk_from(a, b, false);
                    self.seen.insert(self.label.clone());
                    return Some(Ok(self.label.clone()));
                }
                Some(Some(Ok(member))) => self.infer_from(&member),
                Some(Some(Err(e))) => {
                    self.stage = Stage::Done;
                    return Some(Err(e));
                }
                Some(None) => {
                    let last = matches!(self.stage, Stage::Component { last: true, .. });
                    self.stage = if last {
                        Stage::Done
                    } else {
                        let (a, b) = (self.label.content_id1(), self.label.content_id2());
                        self.walk_from(b, a, true)
                    };
                }
            }
        }
    }
}

/// See [`LabelStore::negative_inference`].
pub struct NegativeInference<'a, K: OrderedKv> {
    store: &'a LabelStore<K>,
    negatives: DirectlyConnected<'a, K>,
    current: Option<NegativeLabelInference<'a, K>>,
}

impl<K: OrderedKv> Iterator for NegativeInference<'_, K> {
    type Item = Result<Label>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(current) = self.current.as_mut() {
                match current.next() {
                    Some(item) => return Some(item),
                    None => self.current = None,
                }
            }
            match self.negatives.next()? {
                Ok(label) if label.is_negative() => {
                    self.current = Some(NegativeLabelInference::new(self.store, label));
                }
                Ok(_) => {}
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
