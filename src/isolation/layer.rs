//! IsolationLayer - Access Control and Contamination Checks
//!
//! `TigerStyle`: Every memory operation passes through `validate_access`
//! before it touches a tier. Denials are values, never panics, and every
//! executed check leaves an audit entry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use serde::Serialize;
use serde_json::Value;

use crate::constants::{
    AUDIT_RING_ENTRIES_COUNT_MAX, CONTAMINATION_RISK_THRESHOLD_DEFAULT,
    CONTAMINATION_WEIGHT_SESSION_ID, CONTAMINATION_WEIGHT_THREAD_ID, CONTAMINATION_WEIGHT_USER_ID,
    CONTEXT_ACCESS_RATE_PER_SEC_MAX, CONTEXT_RATE_CHECK_ACCESS_COUNT_MIN,
    CONTEXT_SESSION_TIMEOUT_MS_DEFAULT,
};
use crate::dst::Clock;
use crate::scope::ScopeKey;
use crate::store::{AuditEntry, MemoryTier, SharingRule, StoreError, StoreResult, TierStore};

use super::audit::AuditLog;
use super::context::{IsolationContext, Operation, Permissions};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the isolation layer.
#[derive(Debug, Clone)]
pub struct IsolationConfig {
    /// Deny when the time since the last access exceeds this
    pub session_timeout_ms: u64,
    /// Deny when contamination risk reaches this value
    pub contamination_risk_threshold: f64,
    /// Consult the rate heuristic only above this access count
    pub rate_check_access_count_min: u64,
    /// Deny when the sustained access rate exceeds this
    pub access_rate_per_sec_max: f64,
    /// Capacity of the in-memory audit ring
    pub audit_ring_capacity: usize,
}

impl Default for IsolationConfig {
    fn default() -> Self {
        Self {
            session_timeout_ms: CONTEXT_SESSION_TIMEOUT_MS_DEFAULT,
            contamination_risk_threshold: CONTAMINATION_RISK_THRESHOLD_DEFAULT,
            rate_check_access_count_min: CONTEXT_RATE_CHECK_ACCESS_COUNT_MIN,
            access_rate_per_sec_max: CONTEXT_ACCESS_RATE_PER_SEC_MAX,
            audit_ring_capacity: AUDIT_RING_ENTRIES_COUNT_MAX,
        }
    }
}

impl IsolationConfig {
    /// Create a config with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the session timeout.
    #[must_use]
    pub fn with_session_timeout_ms(mut self, ms: u64) -> Self {
        assert!(ms > 0, "session_timeout_ms must be positive");
        self.session_timeout_ms = ms;
        self
    }

    /// Set the contamination risk threshold.
    #[must_use]
    pub fn with_contamination_threshold(mut self, threshold: f64) -> Self {
        assert!(
            (0.0..=1.0).contains(&threshold),
            "threshold must be in [0, 1]"
        );
        self.contamination_risk_threshold = threshold;
        self
    }

    /// Set the rate heuristic parameters.
    #[must_use]
    pub fn with_rate_limit(mut self, access_count_min: u64, rate_per_sec_max: f64) -> Self {
        assert!(rate_per_sec_max > 0.0, "rate_per_sec_max must be positive");
        self.rate_check_access_count_min = access_count_min;
        self.access_rate_per_sec_max = rate_per_sec_max;
        self
    }
}

// =============================================================================
// Decisions and Reports
// =============================================================================

/// Outcome of one `validate_access` call.
///
/// Denials are returned as values and always audited; this type is never
/// wrapped in an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessDecision {
    /// Whether the operation may proceed
    pub allowed: bool,
    /// Stable reason string for the decision
    pub reason: String,
}

impl AccessDecision {
    /// An allowing decision.
    #[must_use]
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            reason: "all checks passed".to_string(),
        }
    }

    /// A denying decision with the given reason.
    #[must_use]
    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }
}

/// Result of a cross-contamination scan for one context.
#[derive(Debug, Clone, Serialize)]
pub struct ContaminationReport {
    /// Context that was scanned
    pub context_id: String,
    /// Whether any tier held foreign records
    pub contaminated: bool,
    /// Foreign record count per tier
    pub foreign_counts: Vec<(MemoryTier, u64)>,
}

/// Aggregate isolation statistics.
#[derive(Debug, Clone, Serialize)]
pub struct IsolationStats {
    /// Live contexts
    pub context_count: usize,
    /// Total `validate_access` calls
    pub validation_count: u64,
    /// Total denials
    pub denial_count: u64,
    /// Total cross-context accesses that passed
    pub cross_context_count: u64,
    /// Total contamination denials and scan hits
    pub contamination_event_count: u64,
    /// Live sharing rules
    pub sharing_rule_count: usize,
    /// Audit entries recorded (including evicted)
    pub audit_entries_recorded: u64,
    /// Configured session timeout
    pub session_timeout_ms: u64,
    /// Configured contamination threshold
    pub contamination_risk_threshold: f64,
}

// =============================================================================
// IsolationLayer
// =============================================================================

/// Gates every memory operation and prevents cross-tenant contamination.
///
/// `TigerStyle`:
/// - Six ordered checks, short-circuiting on first failure
/// - Every executed check produces an audit entry
/// - Denials and cross-context passes are persisted
/// - Cross-user access is never allowed, regardless of rules
pub struct IsolationLayer {
    store: Arc<dyn TierStore>,
    clock: Clock,
    config: IsolationConfig,
    contexts: RwLock<HashMap<String, IsolationContext>>,
    rules: RwLock<Vec<SharingRule>>,
    audit: Mutex<AuditLog>,
    validation_count: AtomicU64,
    denial_count: AtomicU64,
    cross_context_count: AtomicU64,
    contamination_event_count: AtomicU64,
}

impl IsolationLayer {
    /// Create a layer with default configuration.
    #[must_use]
    pub fn new(store: Arc<dyn TierStore>, clock: Clock) -> Self {
        Self::with_config(store, clock, IsolationConfig::default())
    }

    /// Create a layer with explicit configuration.
    #[must_use]
    pub fn with_config(store: Arc<dyn TierStore>, clock: Clock, config: IsolationConfig) -> Self {
        Self {
            store,
            clock,
            audit: Mutex::new(AuditLog::with_capacity(config.audit_ring_capacity)),
            config,
            contexts: RwLock::new(HashMap::new()),
            rules: RwLock::new(Vec::new()),
            validation_count: AtomicU64::new(0),
            denial_count: AtomicU64::new(0),
            cross_context_count: AtomicU64::new(0),
            contamination_event_count: AtomicU64::new(0),
        }
    }

    // =========================================================================
    // Contexts
    // =========================================================================

    /// Create (or return the existing) context for a scope key.
    ///
    /// Idempotent: the same key always resolves to the same context.
    pub fn create_context(&self, key: ScopeKey) -> IsolationContext {
        self.create_context_with_permissions(key, Permissions::full())
    }

    /// Create a context with explicit permissions.
    ///
    /// If the context already exists it is returned unchanged; permissions
    /// of a live context are never silently widened.
    pub fn create_context_with_permissions(
        &self,
        key: ScopeKey,
        permissions: Permissions,
    ) -> IsolationContext {
        let context_id = key.derived_id();
        let mut contexts = self.contexts.write().unwrap();

        contexts
            .entry(context_id)
            .or_insert_with(|| IsolationContext::new(key, permissions, self.clock.now_ms()))
            .clone()
    }

    /// Look up a context by id.
    #[must_use]
    pub fn context(&self, context_id: &str) -> Option<IsolationContext> {
        self.contexts.read().unwrap().get(context_id).cloned()
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Validate an operation against a context.
    ///
    /// Runs the ordered check sequence, short-circuiting on the first
    /// failure. Every executed check produces an audit entry; denials and
    /// cross-context passes are persisted.
    #[tracing::instrument(skip(self, metadata))]
    pub async fn validate_access(
        &self,
        context_id: &str,
        operation: &str,
        target_context_id: Option<&str>,
        metadata: Option<&Value>,
    ) -> AccessDecision {
        self.validation_count.fetch_add(1, Ordering::Relaxed);

        // Check 1: context existence
        let Some(ctx) = self.context(context_id) else {
            return self
                .deny(None, operation, context_id, target_context_id, format!(
                    "context not found: {context_id}"
                ))
                .await;
        };
        self.audit_pass(&ctx, operation, None, "context exists").await;

        // Check 2: basic permission for the operation kind
        let Some(op) = Operation::parse(operation) else {
            return self
                .deny(
                    Some(&ctx),
                    operation,
                    context_id,
                    target_context_id,
                    format!("unknown operation: {operation}"),
                )
                .await;
        };
        if !ctx.permissions.grants(op.kind()) {
            return self
                .deny(
                    Some(&ctx),
                    operation,
                    context_id,
                    target_context_id,
                    format!("operation {op} not permitted for context"),
                )
                .await;
        }
        self.audit_pass(&ctx, operation, None, "permission granted").await;

        // Check 3: cross-context rules
        if let Some(target_id) = target_context_id {
            if target_id != context_id {
                let Some(target) = self.context(target_id) else {
                    return self
                        .deny(
                            Some(&ctx),
                            operation,
                            context_id,
                            target_context_id,
                            format!("target context not found: {target_id}"),
                        )
                        .await;
                };

                // Hard invariant: different users never share a boundary
                if target.key.user_id != ctx.key.user_id {
                    return self
                        .deny(
                            Some(&ctx),
                            operation,
                            context_id,
                            target_context_id,
                            "cross-user isolation: contexts belong to different users",
                        )
                        .await;
                }

                if op.is_destructive() {
                    return self
                        .deny(
                            Some(&ctx),
                            operation,
                            context_id,
                            target_context_id,
                            format!("destructive operation {op} never allowed across contexts"),
                        )
                        .await;
                }

                if !ctx.permissions.cross_agent {
                    return self
                        .deny(
                            Some(&ctx),
                            operation,
                            context_id,
                            target_context_id,
                            "cross-agent access not permitted for this context",
                        )
                        .await;
                }

                // Same-user cross-agent defaults to allowed; an explicit
                // rule can still deny it.
                if let Some(rule_id) = self.denying_rule(context_id, target_id, op) {
                    return self
                        .deny(
                            Some(&ctx),
                            operation,
                            context_id,
                            target_context_id,
                            format!("sharing rule {rule_id} denies {op}"),
                        )
                        .await;
                }

                self.cross_context_count.fetch_add(1, Ordering::Relaxed);
                self.audit_cross_context_pass(&ctx, operation, target_id)
                    .await;
            }
        }

        // Check 4: contamination heuristic over supplied metadata
        if let Some(metadata) = metadata {
            let risk = self.contamination_risk(&ctx, metadata);
            if risk >= self.config.contamination_risk_threshold {
                self.contamination_event_count.fetch_add(1, Ordering::Relaxed);
                return self
                    .deny(
                        Some(&ctx),
                        operation,
                        context_id,
                        target_context_id,
                        format!("contamination risk {risk:.2} at or above threshold"),
                    )
                    .await;
            }
            self.audit_pass(
                &ctx,
                operation,
                None,
                format!("contamination risk {risk:.2} below threshold"),
            )
            .await;
        }

        // Check 5: suspicious access rate
        let now_ms = self.clock.now_ms();
        if ctx.access_count >= self.config.rate_check_access_count_min {
            let rate = ctx.access_rate_per_sec(now_ms);
            if rate > self.config.access_rate_per_sec_max {
                return self
                    .deny(
                        Some(&ctx),
                        operation,
                        context_id,
                        target_context_id,
                        format!("suspicious access rate {rate:.1}/s"),
                    )
                    .await;
            }
        }
        self.audit_pass(&ctx, operation, None, "access rate nominal").await;

        // Check 6: session timeout
        if now_ms.saturating_sub(ctx.last_access_ms) > self.config.session_timeout_ms {
            return self
                .deny(
                    Some(&ctx),
                    operation,
                    context_id,
                    target_context_id,
                    "session expired",
                )
                .await;
        }
        self.audit_pass(&ctx, operation, None, "session active").await;

        // All checks passed: refresh the context
        {
            let mut contexts = self.contexts.write().unwrap();
            if let Some(live) = contexts.get_mut(context_id) {
                live.access_count += 1;
                live.last_access_ms = now_ms;
            }
        }

        AccessDecision::allowed()
    }

    /// Find a non-expired rule that explicitly denies this operation
    /// between the two contexts. Returns the rule id.
    fn denying_rule(&self, context_a: &str, context_b: &str, op: Operation) -> Option<String> {
        let now = self.clock.now();
        let rules = self.rules.read().unwrap();
        rules
            .iter()
            .find(|rule| {
                !rule.allow
                    && !rule.is_expired(now)
                    && rule.applies_to(context_a, context_b)
                    && rule.covers(op.as_str())
            })
            .map(|rule| rule.id.clone())
    }

    // =========================================================================
    // Contamination
    // =========================================================================

    /// Score embedded identifiers in metadata that do not match the context.
    ///
    /// The session baseline is the top-level `session_id` the caller
    /// declared; embedded session ids elsewhere in the payload are compared
    /// against it. Risk accumulates per weighted mismatch, clamped to [0, 1].
    fn contamination_risk(&self, ctx: &IsolationContext, metadata: &Value) -> f64 {
        let declared_session = metadata.get("session_id").and_then(Value::as_str);

        let mut risk: f64 = 0.0;
        let mut stack: Vec<(&Value, usize)> = vec![(metadata, 0)];

        while let Some((value, depth)) = stack.pop() {
            match value {
                Value::Object(map) => {
                    for (key, nested) in map {
                        let normalized: String = key
                            .chars()
                            .filter(|c| c.is_ascii_alphanumeric())
                            .collect::<String>()
                            .to_lowercase();

                        if let Some(text) = nested.as_str() {
                            match normalized.as_str() {
                                "userid" | "owneruserid" => {
                                    if text != ctx.key.user_id {
                                        risk += CONTAMINATION_WEIGHT_USER_ID;
                                    }
                                }
                                "sessionid" => {
                                    // The declared top-level session is the
                                    // baseline, not a mismatch against itself
                                    if depth > 0 {
                                        if let Some(declared) = declared_session {
                                            if text != declared {
                                                risk += CONTAMINATION_WEIGHT_SESSION_ID;
                                            }
                                        }
                                    }
                                }
                                "threadid" => {
                                    if let Some(ref thread_id) = ctx.key.thread_id {
                                        if text != thread_id {
                                            risk += CONTAMINATION_WEIGHT_THREAD_ID;
                                        }
                                    }
                                }
                                _ => {}
                            }
                        }
                        stack.push((nested, depth + 1));
                    }
                }
                Value::Array(items) => {
                    for item in items {
                        stack.push((item, depth + 1));
                    }
                }
                _ => {}
            }
        }

        let risk = risk.min(1.0);

        // Postcondition
        assert!((0.0..=1.0).contains(&risk), "risk must be in [0, 1]");
        risk
    }

    /// Count foreign-owner records in every tier visible to a context.
    ///
    /// Store failures degrade to a zero count with a warning; a scan never
    /// fails the caller.
    pub async fn check_cross_contamination(&self, context_id: &str) -> Option<ContaminationReport> {
        let ctx = self.context(context_id)?;

        let mut foreign_counts = Vec::new();
        let mut contaminated = false;

        for tier in MemoryTier::all() {
            let count = match self
                .store
                .count_foreign_records(ctx.key.agent_id, &ctx.key.user_id, *tier)
                .await
            {
                Ok(count) => count,
                Err(error) => {
                    tracing::warn!(%error, tier = %tier, "contamination scan query failed");
                    0
                }
            };

            if count > 0 {
                contaminated = true;
            }
            foreign_counts.push((*tier, count));
        }

        if contaminated {
            self.contamination_event_count.fetch_add(1, Ordering::Relaxed);
            let mut contexts = self.contexts.write().unwrap();
            if let Some(live) = contexts.get_mut(context_id) {
                live.contaminated = true;
            }
            tracing::warn!(context_id, "cross-contamination detected");
        }

        Some(ContaminationReport {
            context_id: context_id.to_string(),
            contaminated,
            foreign_counts,
        })
    }

    /// Run a comprehensive contamination scan over every live context.
    pub async fn run_security_scan(&self) -> Vec<ContaminationReport> {
        let context_ids: Vec<String> = {
            let contexts = self.contexts.read().unwrap();
            let mut ids: Vec<String> = contexts.keys().cloned().collect();
            ids.sort();
            ids
        };

        let mut reports = Vec::with_capacity(context_ids.len());
        for context_id in context_ids {
            if let Some(report) = self.check_cross_contamination(&context_id).await {
                reports.push(report);
            }
        }
        reports
    }

    // =========================================================================
    // Sharing Rules
    // =========================================================================

    /// Create an explicit sharing rule between two same-user contexts.
    ///
    /// # Errors
    /// Returns a validation error if either context is missing, the contexts
    /// belong to different users, or the granting context lacks the share
    /// permission.
    pub async fn create_sharing_rule(
        &self,
        from_context_id: &str,
        to_context_id: &str,
        operations: &[Operation],
        allow: bool,
        ttl_ms: Option<u64>,
    ) -> StoreResult<SharingRule> {
        let from = self
            .context(from_context_id)
            .ok_or_else(|| StoreError::validation(format!("context not found: {from_context_id}")))?;
        let to = self
            .context(to_context_id)
            .ok_or_else(|| StoreError::validation(format!("context not found: {to_context_id}")))?;

        // Cross-user grants are structurally impossible
        if from.key.user_id != to.key.user_id {
            return Err(StoreError::validation(
                "sharing rules cannot span users".to_string(),
            ));
        }
        if !from.permissions.share {
            return Err(StoreError::validation(
                "granting context lacks share permission".to_string(),
            ));
        }

        let now = self.clock.now();
        let expires_at = ttl_ms.map(|ttl| now + chrono::Duration::milliseconds(ttl as i64));
        let rule = SharingRule::new(
            from_context_id,
            to_context_id,
            operations.iter().map(|op| op.as_str().to_string()).collect(),
            allow,
            now,
            expires_at,
        );

        self.rules.write().unwrap().push(rule.clone());

        // Persistence is best-effort; the in-memory rule is authoritative
        if let Err(error) = self.store.upsert_sharing_rule(&rule).await {
            tracing::warn!(%error, rule_id = %rule.id, "failed to persist sharing rule");
        }

        Ok(rule)
    }

    /// Drop expired rules. Returns the number removed.
    pub fn prune_expired_rules(&self) -> usize {
        let now = self.clock.now();
        let mut rules = self.rules.write().unwrap();
        let before = rules.len();
        rules.retain(|rule| !rule.is_expired(now));
        before - rules.len()
    }

    // =========================================================================
    // Audit plumbing
    // =========================================================================

    async fn deny(
        &self,
        ctx: Option<&IsolationContext>,
        operation: &str,
        context_id: &str,
        target_context_id: Option<&str>,
        reason: impl Into<String>,
    ) -> AccessDecision {
        let reason = reason.into();
        self.denial_count.fetch_add(1, Ordering::Relaxed);

        let entry = self.make_entry(ctx, operation, context_id, target_context_id, false, &reason);
        self.record_entry(entry, true).await;

        tracing::debug!(context_id, operation, %reason, "access denied");
        AccessDecision::denied(reason)
    }

    async fn audit_pass(
        &self,
        ctx: &IsolationContext,
        operation: &str,
        target_context_id: Option<&str>,
        reason: impl Into<String>,
    ) {
        let entry = self.make_entry(
            Some(ctx),
            operation,
            &ctx.context_id,
            target_context_id,
            true,
            &reason.into(),
        );
        self.record_entry(entry, false).await;
    }

    async fn audit_cross_context_pass(
        &self,
        ctx: &IsolationContext,
        operation: &str,
        target_context_id: &str,
    ) {
        let entry = self.make_entry(
            Some(ctx),
            operation,
            &ctx.context_id,
            Some(target_context_id),
            true,
            "cross-context access allowed",
        );
        // Cross-context passes are security-relevant: persist them
        self.record_entry(entry, true).await;
    }

    fn make_entry(
        &self,
        ctx: Option<&IsolationContext>,
        operation: &str,
        context_id: &str,
        target_context_id: Option<&str>,
        allowed: bool,
        reason: &str,
    ) -> AuditEntry {
        let (agent_id, user_id) = ctx
            .map(|c| (c.key.agent_id, c.key.user_id.clone()))
            .unwrap_or((0, "unknown".to_string()));

        AuditEntry::new(
            agent_id,
            user_id,
            operation,
            context_id,
            target_context_id.map(String::from),
            allowed,
            reason,
            self.clock.now(),
        )
    }

    async fn record_entry(&self, entry: AuditEntry, persist: bool) {
        if persist {
            if let Err(error) = self.store.append_audit(&entry).await {
                tracing::warn!(%error, "failed to persist audit entry");
            }
        }
        self.audit.lock().unwrap().record(entry);
    }

    /// The most recent `n` audit entries, newest first.
    #[must_use]
    pub fn recent_audit(&self, n: usize) -> Vec<AuditEntry> {
        self.audit.lock().unwrap().recent(n)
    }

    // =========================================================================
    // Stats
    // =========================================================================

    /// Aggregate statistics. Read-only, no side effects.
    #[must_use]
    pub fn stats(&self) -> IsolationStats {
        IsolationStats {
            context_count: self.contexts.read().unwrap().len(),
            validation_count: self.validation_count.load(Ordering::Relaxed),
            denial_count: self.denial_count.load(Ordering::Relaxed),
            cross_context_count: self.cross_context_count.load(Ordering::Relaxed),
            contamination_event_count: self.contamination_event_count.load(Ordering::Relaxed),
            sharing_rule_count: self.rules.read().unwrap().len(),
            audit_entries_recorded: self.audit.lock().unwrap().total_recorded(),
            session_timeout_ms: self.config.session_timeout_ms,
            contamination_risk_threshold: self.config.contamination_risk_threshold,
        }
    }
}
