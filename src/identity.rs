//! Identity resolution across calendar, chat, and file-sharing references.
//!
//! Person references arrive in three inconsistent shapes: some carry an
//! upstream directory id, some only an email, some nothing but a display
//! name. The resolver reconciles them into canonical `PersonKey`s, one per
//! human per run. Resolution never fails — in the worst case a new key is
//! allocated. Keys merge (name-only into email-bearing) but never split
//! within a run.

use std::collections::HashMap;

use unicode_normalization::UnicodeNormalization;

use crate::error::{Warning, WarningKind};
use crate::types::{PersonId, PersonKey};

/// A raw person reference from any source, before canonicalisation.
#[derive(Debug, Clone, Default)]
pub struct PersonRef {
    pub upstream_id: Option<String>,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

impl PersonRef {
    pub fn new(
        upstream_id: Option<String>,
        email: Option<String>,
        display_name: Option<String>,
    ) -> Self {
        Self {
            upstream_id,
            email,
            display_name,
        }
    }
}

/// Normalise an email for identity matching: lower-case, trim surrounding
/// whitespace. The local part is never altered — plus-tag stripping would
/// attribute two people's mail to one key.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Normalise a display name: Unicode NFC, case-fold, collapse inner
/// whitespace.
pub fn normalize_name(name: &str) -> String {
    let composed: String = name.trim().nfc().collect();
    composed
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub struct IdentityResolver {
    user_id: Option<String>,
    user_email: String,
    entries: Vec<PersonKey>,
    by_id: HashMap<String, PersonId>,
    by_email: HashMap<String, PersonId>,
    /// All keys currently carrying a given normalised name. Name matching
    /// is only attempted when exactly one key carries the name.
    by_name: HashMap<String, Vec<PersonId>>,
    warnings: Vec<Warning>,
}

impl IdentityResolver {
    pub fn new(user_id: Option<&str>, user_email: &str) -> Self {
        Self {
            user_id: user_id.map(|s| s.to_string()),
            user_email: normalize_email(user_email),
            entries: Vec::new(),
            by_id: HashMap::new(),
            by_email: HashMap::new(),
            by_name: HashMap::new(),
            warnings: Vec::new(),
        }
    }

    /// Preload a canonical identity from the cache's identity table. Seeds
    /// are trusted: a later event may extend them but never contradict.
    pub fn seed(&mut self, upstream_id: Option<&str>, email: Option<&str>, name: Option<&str>) {
        let reference = PersonRef::new(
            upstream_id.map(|s| s.to_string()),
            email.map(|s| s.to_string()),
            name.map(|s| s.to_string()),
        );
        let _ = self.resolve(&reference);
    }

    /// Canonicalise one reference. Returns `None` when the reference is
    /// the current user or carries nothing usable — self is never a
    /// collaborator, and an empty reference cannot identify one.
    ///
    /// Rules, first match wins:
    /// 1. known upstream id
    /// 2. known normalised email (opportunistically attach the id)
    /// 3. display name matching a single existing key, with no email
    ///    conflict — a low-confidence merge
    /// 4. allocate a new key
    pub fn resolve(&mut self, reference: &PersonRef) -> Option<PersonId> {
        let id = reference
            .upstream_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let email = reference
            .email
            .as_deref()
            .map(normalize_email)
            .filter(|s| !s.is_empty());
        let name = reference
            .display_name
            .as_deref()
            .map(normalize_name)
            .filter(|s| !s.is_empty());
        // Raw display text, kept for the canonical key (normalisation is
        // for matching only).
        let display = reference
            .display_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string());

        // Self-filter
        if email.as_deref() == Some(self.user_email.as_str()) {
            return None;
        }
        if let (Some(id), Some(user_id)) = (id, self.user_id.as_deref()) {
            if id == user_id {
                return None;
            }
        }
        if id.is_none() && email.is_none() && name.is_none() {
            return None;
        }

        let id_hit = id.and_then(|i| self.by_id.get(i).copied());
        let email_hit = email.as_deref().and_then(|e| self.by_email.get(e).copied());

        match (id_hit, email_hit) {
            (Some(a), Some(b)) if a != b => {
                // Two pre-existing keys would have to merge. Refuse: keep
                // both, attribute the event to the email-bearing key.
                self.warnings.push(Warning::new(
                    WarningKind::IdentityAmbiguity,
                    format!(
                        "reference joins two existing identities ({} / {}); merge refused",
                        self.entries[a.index()].label(),
                        self.entries[b.index()].label()
                    ),
                ));
                return Some(b);
            }
            (Some(hit), _) => {
                self.enrich(hit, None, email.as_deref(), display.as_deref());
                return Some(hit);
            }
            (None, Some(hit)) => {
                self.enrich(hit, id, None, display.as_deref());
                return Some(hit);
            }
            (None, None) => {}
        }

        // Rule 3: name-only match against a single existing key.
        if let Some(name) = name.as_deref() {
            if let Some(hit) = self.name_match(name, email.as_deref()) {
                self.entries[hit.index()].low_confidence_merge = true;
                self.warnings.push(Warning::new(
                    WarningKind::LowConfidenceMerge,
                    format!(
                        "merged reference {:?} into existing key {} by display name",
                        display.as_deref().unwrap_or(name),
                        self.entries[hit.index()].label()
                    ),
                ));
                self.enrich(hit, id, email.as_deref(), display.as_deref());
                return Some(hit);
            }
        }

        Some(self.allocate(id, email, display, name))
    }

    /// Find the single key carrying `name`, unless that would conflict on
    /// email. A name shared by several keys is never matched.
    fn name_match(&self, name: &str, email: Option<&str>) -> Option<PersonId> {
        let candidates = self.by_name.get(name)?;
        if candidates.len() != 1 {
            return None;
        }
        let hit = candidates[0];
        let existing = &self.entries[hit.index()];
        match (existing.email.as_deref(), email) {
            // Existing key's email differs from the incoming one: not the
            // same person. (Equal emails are handled by rule 2.)
            (Some(_), Some(_)) => None,
            _ => Some(hit),
        }
    }

    /// Attach newly learned identifiers to an existing key. Extends, never
    /// contradicts: present values are kept.
    fn enrich(
        &mut self,
        person: PersonId,
        id: Option<&str>,
        email: Option<&str>,
        display: Option<&str>,
    ) {
        if let Some(id) = id {
            // Only index the id if it is not already claimed elsewhere.
            if self.entries[person.index()].upstream_id.is_none() && !self.by_id.contains_key(id) {
                self.entries[person.index()].upstream_id = Some(id.to_string());
                self.by_id.insert(id.to_string(), person);
            }
        }
        if let Some(email) = email {
            if self.entries[person.index()].email.is_none() && !self.by_email.contains_key(email) {
                self.entries[person.index()].email = Some(email.to_string());
                self.by_email.insert(email.to_string(), person);
            }
        }
        if let Some(display) = display {
            if self.entries[person.index()].display_name.is_none() {
                self.entries[person.index()].display_name = Some(display.to_string());
                self.by_name
                    .entry(normalize_name(display))
                    .or_default()
                    .push(person);
            }
        }
    }

    fn allocate(
        &mut self,
        id: Option<&str>,
        email: Option<String>,
        display: Option<String>,
        name: Option<String>,
    ) -> PersonId {
        let person = PersonId(self.entries.len() as u32);
        if let Some(id) = id {
            self.by_id.insert(id.to_string(), person);
        }
        if let Some(email) = email.as_deref() {
            self.by_email.insert(email.to_string(), person);
        }
        if let Some(name) = name {
            self.by_name.entry(name).or_default().push(person);
        }
        self.entries.push(PersonKey {
            upstream_id: id.map(|s| s.to_string()),
            email,
            display_name: display,
            low_confidence_merge: false,
        });
        person
    }

    pub fn key(&self, person: PersonId) -> &PersonKey {
        &self.entries[person.index()]
    }

    pub fn key_count(&self) -> usize {
        self.entries.len()
    }

    /// All canonical keys, indexed by `PersonId`.
    pub fn keys(&self) -> &[PersonKey] {
        &self.entries
    }

    /// Drain accumulated merge/ambiguity warnings for the run audit trail.
    pub fn take_warnings(&mut self) -> Vec<Warning> {
        std::mem::take(&mut self.warnings)
    }
}
