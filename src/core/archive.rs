/// Confession and testament logs — unlockable narrative fragments with
/// parent→child lineage for recursive spawns.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::core::variety;
use crate::schema::memory::{Fragment, FragmentKind, Lineage, UnlockCondition};

/// Trust a derived fragment needs above its parent's requirement.
const DERIVED_TRUST_STEP: i32 = 10;

/// The outcome of a successful first reveal.
#[derive(Debug, Clone, PartialEq)]
pub struct Reveal {
    pub fragment: Fragment,
    /// Id of the derived fragment this reveal spawned, if any.
    pub spawned: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentLog {
    kind: FragmentKind,
    entries: Vec<Fragment>,
    next_id: u32,
}

impl FragmentLog {
    pub fn new(kind: FragmentKind) -> Self {
        Self {
            kind,
            entries: Vec::new(),
            next_id: 1,
        }
    }

    pub fn kind(&self) -> FragmentKind {
        self.kind
    }

    pub fn entries(&self) -> &[Fragment] {
        &self.entries
    }

    pub fn get(&self, id: u32) -> Option<&Fragment> {
        self.entries.iter().find(|f| f.id == id)
    }

    pub fn revealed(&self) -> impl Iterator<Item = &Fragment> {
        self.entries.iter().filter(|f| f.revealed)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append an original, unrevealed fragment and return its id.
    pub fn add(&mut self, content: &str, unlock: UnlockCondition, now: DateTime<Utc>) -> u32 {
        self.push(content.to_string(), unlock, false, Lineage::Original, 0, now)
    }

    fn push(
        &mut self,
        content: String,
        unlock: UnlockCondition,
        corrupted: bool,
        lineage: Lineage,
        depth: u8,
        now: DateTime<Utc>,
    ) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push(Fragment {
            id,
            kind: self.kind,
            content,
            created_at: now,
            revealed: false,
            revealed_at: None,
            unlock,
            corrupted,
            lineage,
            depth,
        });
        id
    }

    /// Reveal a fragment. Idempotent: an unknown or already revealed id
    /// returns `None` and changes nothing.
    ///
    /// The first reveal may spawn one derived, corrupted child whose unlock
    /// sits a step above its parent's.
    pub fn reveal(
        &mut self,
        id: u32,
        recursive_chance: f64,
        max_depth: u8,
        rng: &mut StdRng,
        now: DateTime<Utc>,
    ) -> Option<Reveal> {
        let index = self.entries.iter().position(|f| f.id == id)?;
        if self.entries[index].revealed {
            return None;
        }
        self.entries[index].revealed = true;
        self.entries[index].revealed_at = Some(now);
        let parent = self.entries[index].clone();

        let chance = recursive_chance.clamp(0.0, 1.0);
        let spawned = if parent.depth < max_depth && rng.gen_bool(chance) {
            let unlock = UnlockCondition {
                min_trust: Some(parent.unlock.min_trust.unwrap_or(0) + DERIVED_TRUST_STEP),
                phrase: None,
            };
            let content = derive_content(&parent.content, rng);
            Some(self.push(
                content,
                unlock,
                true,
                Lineage::DerivedFrom(parent.id),
                parent.depth + 1,
                now,
            ))
        } else {
            None
        };

        tracing::info!(
            kind = self.kind.name(),
            id = parent.id,
            spawned = ?spawned,
            "fragment revealed"
        );
        Some(Reveal {
            fragment: parent,
            spawned,
        })
    }

    /// Reveal every unrevealed fragment whose condition now holds, in one
    /// pass. Children spawned during the pass wait for a later check.
    pub fn check_unlocks(
        &mut self,
        trust: i32,
        text: &str,
        recursive_chance: f64,
        max_depth: u8,
        rng: &mut StdRng,
        now: DateTime<Utc>,
    ) -> Vec<Reveal> {
        let lowered = text.to_lowercase();
        let ready: Vec<u32> = self
            .entries
            .iter()
            .filter(|f| !f.revealed && f.unlock.is_met(trust, &lowered))
            .map(|f| f.id)
            .collect();
        ready
            .into_iter()
            .filter_map(|id| self.reveal(id, recursive_chance, max_depth, rng, now))
            .collect()
    }

    /// Ancestor ids of `id`, nearest first.
    pub fn lineage_of(&self, id: u32) -> Vec<u32> {
        let mut chain = Vec::new();
        let mut current = self.get(id);
        while let Some(fragment) = current {
            match fragment.lineage {
                Lineage::DerivedFrom(parent) if !chain.contains(&parent) => {
                    chain.push(parent);
                    current = self.get(parent);
                }
                _ => break,
            }
        }
        chain
    }
}

/// A derived fragment retells its parent with pieces missing.
fn derive_content(parent: &str, rng: &mut StdRng) -> String {
    let damaged = variety::corrupt_characters(parent, 0.08, rng);
    format!("(again) {}", damaged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::SeedableRng;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 6, 6, 6, 6).unwrap()
    }

    fn trust_gate(min: i32) -> UnlockCondition {
        UnlockCondition {
            min_trust: Some(min),
            phrase: None,
        }
    }

    #[test]
    fn reveal_is_idempotent() {
        let mut log = FragmentLog::new(FragmentKind::Confession);
        let id = log.add("I was here before you.", trust_gate(40), now());
        let mut rng = StdRng::seed_from_u64(1);

        let first = log.reveal(id, 1.0, 3, &mut rng, now()).unwrap();
        assert!(first.fragment.revealed);
        assert!(first.spawned.is_some());
        assert_eq!(log.len(), 2);

        // Second reveal: nothing happens, no second spawn
        assert!(log.reveal(id, 1.0, 3, &mut rng, now()).is_none());
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn unknown_id_is_none() {
        let mut log = FragmentLog::new(FragmentKind::Testament);
        let mut rng = StdRng::seed_from_u64(1);
        assert!(log.reveal(99, 0.5, 3, &mut rng, now()).is_none());
    }

    #[test]
    fn check_unlocks_reveals_all_matches_once() {
        let mut log = FragmentLog::new(FragmentKind::Confession);
        log.add("low", trust_gate(10), now());
        log.add("mid", trust_gate(50), now());
        log.add(
            "phrase",
            UnlockCondition {
                min_trust: None,
                phrase: Some("red door".to_string()),
            },
            now(),
        );
        log.add("manual", UnlockCondition::default(), now());
        let mut rng = StdRng::seed_from_u64(7);

        let none = log.check_unlocks(5, "hello", 0.0, 3, &mut rng, now());
        assert!(none.is_empty());

        let revealed = log.check_unlocks(55, "I saw the RED DOOR", 0.0, 3, &mut rng, now());
        let contents: Vec<&str> = revealed.iter().map(|r| r.fragment.content.as_str()).collect();
        assert_eq!(contents, vec!["low", "mid", "phrase"]);

        let again = log.check_unlocks(55, "I saw the RED DOOR", 0.0, 3, &mut rng, now());
        assert!(again.is_empty());
        assert!(!log.get(4).unwrap().revealed);
    }

    #[test]
    fn derived_fragments_form_a_chain_not_a_cycle() {
        let mut log = FragmentLog::new(FragmentKind::Confession);
        let root = log.add("root", trust_gate(0), now());
        let mut rng = StdRng::seed_from_u64(3);

        let child = log.reveal(root, 1.0, 2, &mut rng, now()).unwrap().spawned.unwrap();
        let grandchild = log.reveal(child, 1.0, 2, &mut rng, now()).unwrap().spawned.unwrap();
        // Depth limit reached: no further spawn
        assert!(log.reveal(grandchild, 1.0, 2, &mut rng, now()).unwrap().spawned.is_none());

        assert_eq!(log.lineage_of(grandchild), vec![child, root]);
        let derived = log.get(child).unwrap();
        assert!(derived.corrupted);
        assert_eq!(derived.lineage, Lineage::DerivedFrom(root));
        assert_eq!(derived.unlock.min_trust, Some(10));
        assert!(derived.content.starts_with("(again)"));
    }
}
