//! Run orchestration: the whole pipeline from raw payloads to a
//! `RankedResult`.
//!
//! Stage order is fixed: seed identities from the cache, extract all three
//! sources, normalise and fingerprint the interaction stream, short-circuit
//! on a fresh cache hit, then classify contexts, filter system accounts,
//! score, annotate dormancy, rank, and persist. Only a config error or an
//! exceeded deadline aborts a run; everything else degrades to warnings on
//! the result.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::cache::CacheDb;
use crate::config::EngineConfig;
use crate::context::ContextClassifier;
use crate::dormancy;
use crate::error::{EngineError, Warning, WarningKind};
use crate::extract::{
    extract_calendar, extract_chat, extract_file_shares, ExtractContext, ExtractorOutput,
};
use crate::filter::{Disposition, SystemAccountFilter};
use crate::identity::{normalize_email, normalize_name, IdentityResolver};
use crate::payload::EnginePayloads;
use crate::ranking::{self, ScoredPerson};
use crate::scoring;
use crate::types::{Interaction, PersonId, RankedResult, Source, WeightInputs};

/// Per-run options. Everything here is optional; a default run uses the
/// wall clock and no deadline.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Reference instant for windowing and decay. Fixing it makes a run
    /// reproducible.
    pub now: Option<DateTime<Utc>>,
    /// Hard wall-clock deadline. Exceeding it cancels the run with no
    /// partial output.
    pub deadline: Option<DateTime<Utc>>,
}

pub struct Engine {
    config: EngineConfig,
    cache: Option<CacheDb>,
}

impl Engine {
    /// Build an engine from a policy. The policy is validated here, before
    /// any payload is touched — a run never starts half-configured.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            config,
            cache: None,
        })
    }

    /// Attach a result/identity cache. Without one, every run recomputes.
    pub fn with_cache(mut self, cache: CacheDb) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Execute one full discovery run.
    pub fn run(
        &self,
        payloads: &EnginePayloads,
        options: &RunOptions,
    ) -> Result<RankedResult, EngineError> {
        let now = options.now.unwrap_or_else(Utc::now);
        let user_key = normalize_email(&payloads.user.email);
        let mut warnings: Vec<Warning> = Vec::new();
        let mut cache_ok = self.cache.is_some();

        let mut resolver = IdentityResolver::new(payloads.user.id.as_deref(), &payloads.user.email);
        if let Some(cache) = self.cache.as_ref() {
            match cache.identity_seeds(&user_key) {
                Ok(seeds) => {
                    for seed in &seeds {
                        resolver.seed(
                            seed.upstream_id.as_deref(),
                            seed.email.as_deref(),
                            seed.display_name.as_deref(),
                        );
                    }
                }
                Err(e) => {
                    log::warn!("identity seed load failed, continuing uncached: {e}");
                    warnings.push(Warning::new(
                        WarningKind::CacheUnavailable,
                        format!("identity seeds unavailable: {e}"),
                    ));
                    cache_ok = false;
                }
            }
        }

        // Extraction. Each source is independent; a degraded source is
        // dropped wholesale with a warning.
        let mut interactions: Vec<Interaction> = Vec::new();
        {
            let mut ctx = ExtractContext {
                resolver: &mut resolver,
                user: &payloads.user,
                now,
                window_start: now - Duration::days(self.config.window_days as i64),
                deadline: options.deadline,
            };
            let empty: Vec<Value> = Vec::new();
            let calendar = payloads.calendar.as_deref().unwrap_or(&empty);
            let chat = payloads.chat.as_deref().unwrap_or(&empty);
            let shares = payloads.file_shares.as_deref().unwrap_or(&empty);

            self.absorb(
                extract_calendar(calendar, &mut ctx)?,
                Source::Calendar,
                &mut interactions,
                &mut warnings,
            );
            self.absorb(
                extract_chat(chat, &mut ctx)?,
                Source::Chat,
                &mut interactions,
                &mut warnings,
            );
            self.absorb(
                extract_file_shares(shares, &mut ctx)?,
                Source::FileShare,
                &mut interactions,
                &mut warnings,
            );
        }
        warnings.extend(resolver.take_warnings());

        // Normalise the stream: scoring is a pure fold over this order.
        {
            let keys = resolver.keys();
            interactions.sort_by(|a, b| {
                a.stream_key()
                    .cmp(&b.stream_key())
                    .then_with(|| keys[a.person.index()].label().cmp(keys[b.person.index()].label()))
            });
        }
        let keys = resolver.keys().to_vec();
        let fingerprint = ranking::input_fingerprint(&interactions, &keys);

        if cache_ok {
            if let Some(cache) = self.cache.as_ref() {
                match cache.lookup(
                    &user_key,
                    self.config.window_days,
                    &fingerprint,
                    self.config.cache_max_age_hours,
                    now,
                ) {
                    Ok(Some(hit)) => {
                        log::info!(
                            "serving cached result {} for fingerprint {}",
                            hit.run_id,
                            &fingerprint[..12]
                        );
                        return Ok(hit);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        log::warn!("cache lookup failed, recomputing: {e}");
                        warnings.push(Warning::new(
                            WarningKind::CacheUnavailable,
                            format!("cache lookup failed: {e}"),
                        ));
                        cache_ok = false;
                    }
                }
            }
        }

        check_deadline(options.deadline, "context classification")?;
        self.attach_contexts(&mut interactions, payloads.calendar.as_deref().unwrap_or(&[]));

        check_deadline(options.deadline, "scoring")?;
        let mut groups: HashMap<PersonId, Vec<&Interaction>> = HashMap::new();
        for interaction in &interactions {
            groups.entry(interaction.person).or_default().push(interaction);
        }

        let filter = SystemAccountFilter::new(&self.config);
        let mut scored: Vec<ScoredPerson> = Vec::new();
        for index in 0..keys.len() {
            let person = PersonId(index as u32);
            let Some(group) = groups.get(&person) else {
                // Seeded identity with no interactions this run.
                continue;
            };
            let key = &keys[index];

            let disposition = filter.classify(key, group);
            if let Disposition::Rejected(reason) = disposition {
                log::debug!("{:?} rejected: {}", key.label(), reason.as_str());
                continue;
            }

            let Some(score) = scoring::score_person(key, group, disposition, now, &self.config)
            else {
                continue;
            };
            let Some(last) = dormancy::last_interaction(group) else {
                continue;
            };
            scored.push(ScoredPerson {
                dormancy: dormancy::annotate(last.timestamp, last.source, now, &self.config),
                direct_evidence: scoring::has_direct_evidence(group),
                score,
            });
        }

        let (active, dormant) = ranking::rank(scored, &self.config);

        // Deterministic warning order: a shuffled payload must produce a
        // byte-identical result.
        warnings.sort_by(|a, b| {
            a.kind
                .as_str()
                .cmp(b.kind.as_str())
                .then_with(|| a.message.cmp(&b.message))
        });
        warnings.dedup();

        let mut result = RankedResult {
            run_id: run_id_for(&fingerprint, now),
            generated_at: now,
            window_days: self.config.window_days,
            input_fingerprint: fingerprint,
            active,
            dormant,
            warnings,
        };
        log::info!(
            "run {}: {} interactions, {} active, {} dormant, {} warnings",
            result.run_id,
            interactions.len(),
            result.active.len(),
            result.dormant.len(),
            result.warnings.len()
        );

        if cache_ok {
            if let Some(cache) = self.cache.as_ref() {
                let persisted = cache
                    .store(&user_key, &result)
                    .and_then(|_| cache.store_identities(&user_key, &keys));
                if let Err(e) = persisted {
                    log::warn!("cache write failed: {e}");
                    result.warnings.push(Warning::new(
                        WarningKind::CacheUnavailable,
                        format!("cache write failed: {e}"),
                    ));
                }
            }
        }

        Ok(result)
    }

    /// Fold one extractor's output into the run, applying the
    /// source-degradation rule: too many invalid records and the whole
    /// source is treated as absent.
    fn absorb(
        &self,
        out: ExtractorOutput,
        source: Source,
        interactions: &mut Vec<Interaction>,
        warnings: &mut Vec<Warning>,
    ) {
        warnings.extend(out.warnings);
        if out.total > 0 && out.invalid as f64 / out.total as f64 >= self.config.p_bad {
            log::warn!(
                "{}: {} of {} records invalid, dropping source",
                source.as_str(),
                out.invalid,
                out.total
            );
            warnings.push(Warning::source_degraded(source.as_str(), out.invalid, out.total));
            return;
        }
        interactions.extend(out.interactions);
    }

    /// Attach a `MeetingContext` to every calendar interaction. Standing
    /// detection counts distinct events per normalised subject across the
    /// whole payload; the automated-organiser check reads the organiser
    /// straight off the raw records.
    fn attach_contexts(&self, interactions: &mut [Interaction], calendar_records: &[Value]) {
        let classifier = ContextClassifier::new(&self.config);
        let organizers = organizers_by_event(calendar_records);

        let mut events_by_subject: HashMap<String, HashSet<&str>> = HashMap::new();
        for interaction in interactions.iter() {
            if interaction.source != Source::Calendar {
                continue;
            }
            if let Some(subject) = interaction.subject_hint.as_deref() {
                events_by_subject
                    .entry(normalize_name(subject))
                    .or_default()
                    .insert(interaction.raw_ref.as_str());
            }
        }
        let occurrences: HashMap<String, u32> = events_by_subject
            .into_iter()
            .map(|(subject, refs)| (subject, refs.len() as u32))
            .collect();

        for interaction in interactions.iter_mut() {
            let WeightInputs::Calendar {
                attendee_count,
                is_recurring,
                ..
            } = interaction.weight_inputs
            else {
                continue;
            };
            let series = interaction
                .subject_hint
                .as_deref()
                .and_then(|s| occurrences.get(&normalize_name(s)))
                .copied()
                .unwrap_or(1);
            interaction.context = Some(classifier.classify(
                attendee_count,
                is_recurring,
                interaction.subject_hint.as_deref(),
                organizers.get(&interaction.raw_ref).map(String::as_str),
                series,
            ));
        }
    }
}

fn check_deadline(deadline: Option<DateTime<Utc>>, stage: &'static str) -> Result<(), EngineError> {
    match deadline {
        Some(deadline) if Utc::now() > deadline => Err(EngineError::Cancelled(stage)),
        _ => Ok(()),
    }
}

/// Organiser email per event id, read off the raw payload for the
/// automated-organiser override.
fn organizers_by_event(records: &[Value]) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for raw in records {
        let Some(id) = raw.get("id").and_then(Value::as_str) else {
            continue;
        };
        if let Some(address) = raw
            .pointer("/organizer/emailAddress/address")
            .and_then(Value::as_str)
        {
            map.insert(id.to_string(), normalize_email(address));
        }
    }
    map
}

/// Run id derived from the fingerprint and the run instant, so two runs
/// over equal inputs at the same `now` are byte-identical.
fn run_id_for(fingerprint: &str, generated_at: DateTime<Utc>) -> Uuid {
    let mut hasher = Sha256::new();
    hasher.update(fingerprint.as_bytes());
    hasher.update(generated_at.to_rfc3339().as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::test_utils::test_cache;
    use crate::payload::UserIdentity;
    use crate::types::{DormancyStatus, ScoreFlag};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 20, 12, 0, 0).unwrap()
    }

    fn user() -> UserIdentity {
        UserIdentity {
            id: Some("me-id".into()),
            email: "me@x.com".into(),
            display_name: Some("Me".into()),
        }
    }

    fn opts() -> RunOptions {
        RunOptions {
            now: Some(now()),
            deadline: None,
        }
    }

    fn payloads(
        calendar: Vec<Value>,
        chat: Vec<Value>,
        file_shares: Vec<Value>,
    ) -> EnginePayloads {
        EnginePayloads {
            user: user(),
            calendar: Some(calendar),
            chat: Some(chat),
            file_shares: Some(file_shares),
        }
    }

    /// Calendar event builder: `organizer` and each attendee as
    /// (name, email) pairs.
    fn event(
        id: &str,
        subject: &str,
        days_ago: i64,
        organizer: (&str, &str),
        attendees: &[(&str, &str)],
    ) -> Value {
        let start = now() - Duration::days(days_ago);
        let end = start + Duration::minutes(30);
        serde_json::json!({
            "id": id,
            "subject": subject,
            "start": {"dateTime": start.to_rfc3339()},
            "end": {"dateTime": end.to_rfc3339()},
            "organizer": {"emailAddress": {"name": organizer.0, "address": organizer.1}},
            "attendees": attendees.iter().map(|(name, addr)| serde_json::json!(
                {"emailAddress": {"name": name, "address": addr}}
            )).collect::<Vec<_>>(),
            "isCancelled": false
        })
    }

    fn share(id: &str, email: &str, share_type: &str, inbound: bool) -> Value {
        serde_json::json!({
            "fileId": id,
            "fileName": "roadmap.xlsx",
            "sharedAt": now().to_rfc3339(),
            "sharedWith": [{"email": email}],
            "shareType": share_type,
            "inbound": inbound
        })
    }

    fn emails_of(entries: &[crate::types::RankedEntry]) -> Vec<String> {
        entries
            .iter()
            .filter_map(|e| e.score.person.email.clone())
            .collect()
    }

    fn engine() -> Engine {
        let _ = env_logger::builder().is_test(true).try_init();
        Engine::new(EngineConfig::default()).expect("valid config")
    }

    #[test]
    fn test_invalid_config_rejected_before_any_work() {
        let cfg = EngineConfig {
            window_days: 0,
            ..Default::default()
        };
        assert!(matches!(Engine::new(cfg), Err(EngineError::Config(_))));
    }

    #[test]
    fn test_self_filter_scenario() {
        let result = engine()
            .run(
                &payloads(
                    vec![event(
                        "e1",
                        "Pairing",
                        0,
                        ("Me", "me@x.com"),
                        &[("Me", "me@x.com"), ("Ana", "ana@x.com")],
                    )],
                    vec![],
                    vec![],
                ),
                &opts(),
            )
            .unwrap();

        assert_eq!(emails_of(&result.active), ["ana@x.com"]);
        assert!(result.dormant.is_empty());
        let evidence = &result.active[0].score.evidence;
        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].context.as_deref(), Some("one_on_one"));
        // Self never appears on either side of the output.
        for entry in result.active.iter().chain(&result.dormant) {
            assert_ne!(entry.score.person.email.as_deref(), Some("me@x.com"));
        }
    }

    #[test]
    fn test_one_on_one_beats_broadcast_scenario() {
        let mut calendar = vec![event(
            "b1",
            "Deep dive",
            0,
            ("Bo", "bo@x.com"),
            &[("Me", "me@x.com"), ("Bo", "bo@x.com")],
        )];
        for n in 0..10 {
            let mut attendees: Vec<(String, String)> = vec![
                ("Me".into(), "me@x.com".into()),
                ("Cast".into(), "cast@x.com".into()),
            ];
            for f in 0..118 {
                attendees.push((format!("Filler {f}"), format!("filler{f}@x.com")));
            }
            let refs: Vec<(&str, &str)> = attendees
                .iter()
                .map(|(n, a)| (n.as_str(), a.as_str()))
                .collect();
            calendar.push(event(
                &format!("c{n}"),
                &format!("Company update {n}"),
                (n % 7) as i64,
                ("Cast", "cast@x.com"),
                &refs,
            ));
        }

        let result = engine()
            .run(&payloads(calendar, vec![], vec![]), &opts())
            .unwrap();

        assert_eq!(emails_of(&result.active), ["bo@x.com"]);
        for entry in result.active.iter().chain(&result.dormant) {
            assert_ne!(entry.score.person.email.as_deref(), Some("cast@x.com"));
        }
    }

    #[test]
    fn test_outbound_share_asymmetry_scenario() {
        let cfg = EngineConfig {
            floor_score: 10.0,
            ..Default::default()
        };
        let engine = Engine::new(cfg).unwrap();
        let result = engine
            .run(
                &payloads(
                    vec![],
                    vec![],
                    vec![
                        share("f1", "d@x.com", "direct", true),
                        share("f2", "e@x.com", "direct", false),
                    ],
                ),
                &opts(),
            )
            .unwrap();

        assert_eq!(emails_of(&result.active), ["e@x.com"]);
        let entry = &result.active[0];
        assert!((entry.score.subscores.file_share - 15.0).abs() < 1e-9);
        assert!(entry.score.flags.contains(&ScoreFlag::DocumentOnly));
        for e in result.active.iter().chain(&result.dormant) {
            assert_ne!(e.score.person.email.as_deref(), Some("d@x.com"));
        }
    }

    #[test]
    fn test_system_account_rejected_scenario() {
        let calendar = (0..5)
            .map(|n| {
                event(
                    &format!("h{n}"),
                    &format!("Public Holiday: Day {n}"),
                    n as i64,
                    ("US Holidays", "holidays@x.com"),
                    &[
                        ("Me", "me@x.com"),
                        ("US Holidays", "holidays@x.com"),
                    ],
                )
            })
            .collect();
        let result = engine()
            .run(&payloads(calendar, vec![], vec![]), &opts())
            .unwrap();
        assert!(result.active.is_empty());
        assert!(result.dormant.is_empty());
    }

    #[test]
    fn test_dormancy_tiers_scenario() {
        // A 90-day window cannot see a 100-day-old interaction; the
        // window is widened so dormancy tiers are observable.
        let cfg = EngineConfig {
            window_days: 120,
            ..Default::default()
        };
        let mut calendar = Vec::new();
        for n in 0..5 {
            calendar.push(event(
                &format!("g{n}"),
                &format!("Roadmap {n}"),
                75 + n as i64,
                ("Gia", "g@x.com"),
                &[("Me", "me@x.com"), ("Gia", "g@x.com")],
            ));
            calendar.push(event(
                &format!("h{n}"),
                &format!("Audit {n}"),
                100 + n as i64,
                ("Hal", "h@x.com"),
                &[("Me", "me@x.com"), ("Hal", "h@x.com")],
            ));
        }
        let result = Engine::new(cfg)
            .unwrap()
            .run(&payloads(calendar, vec![], vec![]), &opts())
            .unwrap();

        assert!(result.active.is_empty());
        assert_eq!(result.dormant.len(), 2);
        let by_email: HashMap<&str, &crate::types::RankedEntry> = result
            .dormant
            .iter()
            .filter_map(|e| e.score.person.email.as_deref().map(|m| (m, e)))
            .collect();
        assert_eq!(by_email["g@x.com"].dormancy.status, DormancyStatus::Dormant);
        assert_eq!(by_email["h@x.com"].dormancy.status, DormancyStatus::HighRisk);
        assert_eq!(by_email["g@x.com"].dormancy.days_since_last_interaction, 75);
        assert_eq!(by_email["h@x.com"].dormancy.days_since_last_interaction, 100);
    }

    #[test]
    fn test_identity_merge_scenario() {
        let calendar = vec![
            // First event carries only a display name for Jane.
            serde_json::json!({
                "id": "e1",
                "subject": "Planning",
                "start": {"dateTime": (now() - Duration::days(2)).to_rfc3339()},
                "organizer": {"emailAddress": {"name": "Me", "address": "me@x.com"}},
                "attendees": [
                    {"emailAddress": {"name": "Me", "address": "me@x.com"}},
                    {"emailAddress": {"name": "Jane Doe"}}
                ]
            }),
            event(
                "e2",
                "Design",
                1,
                ("Me", "me@x.com"),
                &[("Me", "me@x.com"), ("Jane Doe", "jane@x.com")],
            ),
        ];
        let result = engine()
            .run(&payloads(calendar, vec![], vec![]), &opts())
            .unwrap();

        assert_eq!(result.active.len(), 1);
        assert!(result.dormant.is_empty());
        let entry = &result.active[0];
        assert_eq!(entry.score.person.email.as_deref(), Some("jane@x.com"));
        // Both events attributed to the single merged key.
        assert_eq!(entry.score.evidence.len(), 2);
        assert!(entry.score.flags.contains(&ScoreFlag::LowConfidenceIdentity));
        assert!(result
            .warnings
            .iter()
            .any(|w| w.kind == WarningKind::LowConfidenceMerge));
    }

    #[test]
    fn test_shuffled_payloads_are_byte_identical() {
        let calendar = vec![
            event(
                "e1",
                "Roadmap",
                2,
                ("Ana", "ana@x.com"),
                &[("Me", "me@x.com"), ("Ana", "ana@x.com"), ("Bo", "bo@x.com")],
            ),
            event(
                "e2",
                "Pairing",
                1,
                ("Me", "me@x.com"),
                &[("Me", "me@x.com"), ("Bo", "bo@x.com")],
            ),
        ];
        let chat = vec![serde_json::json!({
            "threadId": "t1",
            "chatType": "oneOnOne",
            "members": [
                {"id": "me-id", "email": "me@x.com"},
                {"id": "u-ana", "email": "ana@x.com", "displayName": "Ana"}
            ],
            "messageCount": 12,
            "sentByUserCount": 7,
            "lastMessageAt": now().to_rfc3339(),
            "hasAttachments": true
        })];
        let shares = vec![share("f1", "bo@x.com", "direct", false)];

        let forward = engine()
            .run(&payloads(calendar.clone(), chat.clone(), shares.clone()), &opts())
            .unwrap();
        let reversed = engine()
            .run(
                &payloads(
                    calendar.into_iter().rev().collect(),
                    chat,
                    shares,
                ),
                &opts(),
            )
            .unwrap();

        assert_eq!(
            serde_json::to_string(&forward).unwrap(),
            serde_json::to_string(&reversed).unwrap()
        );
    }

    #[test]
    fn test_cache_serves_second_run_verbatim() {
        let engine = engine().with_cache(test_cache());
        let calendar = vec![event(
            "e1",
            "Pairing",
            1,
            ("Me", "me@x.com"),
            &[("Me", "me@x.com"), ("Ana", "ana@x.com")],
        )];
        let first = engine
            .run(&payloads(calendar.clone(), vec![], vec![]), &opts())
            .unwrap();
        // Second run, same inputs, two hours later: served from cache,
        // identical down to run id and generated_at.
        let later = RunOptions {
            now: Some(now() + Duration::hours(2)),
            deadline: None,
        };
        let second = engine
            .run(&payloads(calendar, vec![], vec![]), &later)
            .unwrap();
        assert_eq!(first, second);

        // The run also persisted canonical identities for future seeding.
        let seeds = engine
            .cache
            .as_ref()
            .unwrap()
            .identity_seeds("me@x.com")
            .unwrap();
        assert!(seeds.iter().any(|s| s.email.as_deref() == Some("ana@x.com")));
    }

    #[test]
    fn test_changed_response_status_misses_cache() {
        let engine = engine().with_cache(test_cache());
        let mut invite = event(
            "e1",
            "Pairing",
            1,
            ("Ana", "ana@x.com"),
            &[("Me", "me@x.com"), ("Ana", "ana@x.com")],
        );
        invite["responseStatus"] = serde_json::json!({"response": "accepted"});
        let first = engine
            .run(&payloads(vec![invite.clone()], vec![], vec![]), &opts())
            .unwrap();
        assert_eq!(emails_of(&first.active), ["ana@x.com"]);

        // The user declines the invite. Timestamps, subject, and event id
        // are unchanged; the fingerprint must still differ, and the run
        // must recompute at the declined weight instead of replaying the
        // cached accepted score.
        invite["responseStatus"] = serde_json::json!({"response": "declined"});
        let later = RunOptions {
            now: Some(now() + Duration::hours(2)),
            deadline: None,
        };
        let second = engine
            .run(&payloads(vec![invite], vec![], vec![]), &later)
            .unwrap();
        assert_ne!(first.input_fingerprint, second.input_fingerprint);
        // 25.0 * 0.3 falls below the default floor score.
        assert!(second.active.is_empty());
    }

    #[test]
    fn test_degraded_source_dropped_with_warning() {
        let chat = vec![
            serde_json::json!({"garbage": 1}),
            serde_json::json!({"noThreadId": true}),
            serde_json::json!({
                "threadId": "t1",
                "chatType": "oneOnOne",
                "members": [{"email": "me@x.com"}, {"email": "ana@x.com"}],
                "messageCount": 4,
                "sentByUserCount": 2,
                "lastMessageAt": now().to_rfc3339()
            }),
        ];
        let result = engine()
            .run(&payloads(vec![], chat, vec![]), &opts())
            .unwrap();
        // 2 of 3 invalid >= p_bad: the valid thread is dropped too.
        assert!(result.active.is_empty());
        assert!(result
            .warnings
            .iter()
            .any(|w| w.kind == WarningKind::SourceDegraded));
        assert!(result
            .warnings
            .iter()
            .any(|w| w.kind == WarningKind::InvalidRecord));
    }

    #[test]
    fn test_expired_deadline_cancels_run() {
        let options = RunOptions {
            now: Some(now()),
            deadline: Some(Utc::now() - Duration::seconds(1)),
        };
        let calendar = vec![event(
            "e1",
            "Pairing",
            1,
            ("Me", "me@x.com"),
            &[("Me", "me@x.com"), ("Ana", "ana@x.com")],
        )];
        let err = engine()
            .run(&payloads(calendar, vec![], vec![]), &options)
            .unwrap_err();
        assert!(matches!(err, EngineError::Cancelled(_)));
    }

    #[test]
    fn test_standing_recurring_discounts_weekly_meeting() {
        // Five occurrences of the same recurring subject: classified
        // standing, so each contributes 25 * 0.6 instead of 25.
        let calendar: Vec<Value> = (0..5)
            .map(|n| {
                let mut e = event(
                    &format!("w{n}"),
                    "Weekly 1:1",
                    (n * 7) as i64,
                    ("Me", "me@x.com"),
                    &[("Me", "me@x.com"), ("Ana", "ana@x.com")],
                );
                e["seriesMasterId"] = Value::String("series-1".into());
                e
            })
            .collect();
        let result = engine()
            .run(&payloads(calendar, vec![], vec![]), &opts())
            .unwrap();
        assert_eq!(emails_of(&result.active), ["ana@x.com"]);
        let evidence = &result.active[0].score.evidence;
        assert!(evidence
            .iter()
            .all(|e| e.context.as_deref() == Some("standing_recurring")));
        // Standing 1:1 still counts as direct evidence (it reached
        // active[]), just discounted.
        let undiscounted = 25.0 * 1.5;
        assert!(evidence[0].contribution < undiscounted);
    }
}
