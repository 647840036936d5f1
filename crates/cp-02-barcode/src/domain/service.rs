//! The barcode service: issuance, binding, transitions.
//!
//! All mutations of one barcode run under that barcode's lock, so the
//! check-then-write sequences below are atomic with respect to each other.
//! Mutations of different barcodes proceed in parallel.

use super::codegen;
use super::entities::{Barcode, BarcodeStatus, GenerationContext, QrPayload, ScanEvent};
use super::errors::BarcodeError;
use super::state;
use crate::ports::outbound::{BarcodeStore, EnvelopeStore, LetterStore};
use crate::{MAX_GENERATION_ATTEMPTS, QR_VERSION};
use chrono::{DateTime, Duration, Utc};
use cp_01_opcode::{mask, OpCode, ViewerScope};
use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared_bus::{EventPublisher, PlatformEvent};
use shared_types::{BarcodeCode, EnvelopeId, EnvelopeStatus, LetterId, LetterStatus, RequestId};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Days a draft letter may sit unbound before cleanup marks it expired.
pub const DRAFT_MAX_AGE_DAYS: i64 = 7;

/// Parameters for binding a barcode to its physical artifacts.
#[derive(Debug, Clone)]
pub struct BindRequest {
    pub code: BarcodeCode,
    pub envelope_id: EnvelopeId,
    pub recipient_op_code: OpCode,
    /// Future-letter reveal time, if the sender scheduled one.
    pub reveal_at: Option<DateTime<Utc>>,
}

/// The barcode lifecycle service.
pub struct BarcodeService {
    barcodes: Arc<dyn BarcodeStore>,
    letters: Arc<dyn LetterStore>,
    envelopes: Arc<dyn EnvelopeStore>,
    bus: Arc<dyn EventPublisher>,
    /// Per-barcode write locks. Entries are never removed; the map is
    /// bounded by the number of live codes a process touches.
    locks: DashMap<BarcodeCode, Arc<Mutex<()>>>,
}

impl BarcodeService {
    pub fn new(
        barcodes: Arc<dyn BarcodeStore>,
        letters: Arc<dyn LetterStore>,
        envelopes: Arc<dyn EnvelopeStore>,
        bus: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            barcodes,
            letters,
            envelopes,
            bus,
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, code: &BarcodeCode) -> Arc<Mutex<()>> {
        self.locks
            .entry(code.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Issue a fresh barcode for `letter_id`.
    ///
    /// The letter must exist and still be a draft. Collisions with existing
    /// codes redraw; a saturated code space surfaces as
    /// [`BarcodeError::CodeSpaceExhausted`].
    pub async fn create(
        &self,
        letter_id: &LetterId,
        ctx: &mut GenerationContext,
    ) -> Result<(Barcode, QrPayload), BarcodeError> {
        let letter = self
            .letters
            .get(letter_id)
            .await?
            .ok_or_else(|| BarcodeError::NotFound {
                code: letter_id.to_string(),
            })?;
        if letter.status != LetterStatus::Draft {
            return Err(BarcodeError::InvalidState {
                status: BarcodeStatus::Unactivated,
                operation: "create barcode for non-draft letter",
            });
        }

        let mut rng = StdRng::from_entropy();
        for attempt in 1..=MAX_GENERATION_ATTEMPTS {
            let code = codegen::draw_code(&mut rng);
            let mut barcode = Barcode::issued(code.clone(), Utc::now());
            // The intended letter is recorded at issuance; bind() freezes it.
            barcode.letter_id = Some(letter_id.clone());
            if self.barcodes.reserve(barcode.clone()).await? {
                ctx.issued += 1;
                debug!(
                    code = %code,
                    batch = %ctx.batch_id,
                    attempt,
                    "Barcode issued"
                );
                let qr = QrPayload {
                    version: QR_VERSION,
                    code: code.clone(),
                    bound_op_hint: None,
                };
                return Ok((barcode, qr));
            }
        }
        Err(BarcodeError::CodeSpaceExhausted {
            attempts: MAX_GENERATION_ATTEMPTS,
        })
    }

    /// Issue `count` barcodes under one generation context.
    ///
    /// Batch issuance is the single-code path in a loop; de-duplication is
    /// enforced by code uniqueness in the store.
    pub async fn create_batch(
        &self,
        letter_ids: &[LetterId],
        ctx: &mut GenerationContext,
    ) -> Result<Vec<(Barcode, QrPayload)>, BarcodeError> {
        let mut issued = Vec::with_capacity(letter_ids.len());
        for letter_id in letter_ids {
            issued.push(self.create(letter_id, ctx).await?);
        }
        Ok(issued)
    }

    /// Bind a barcode to its letter, an envelope and a recipient code.
    ///
    /// The letter was recorded at issuance. Preconditions: the barcode is
    /// `unactivated`, the envelope carries no binding, and the letter is an
    /// unbound draft. On success the letter's recipient code is frozen and a
    /// `BarcodeBound` event fires.
    pub async fn bind(
        &self,
        request: BindRequest,
        request_id: Option<RequestId>,
    ) -> Result<Barcode, BarcodeError> {
        let lock = self.lock_for(&request.code);
        let _guard = lock.lock().await;

        let mut barcode = self.fetch(&request.code).await?;
        if barcode.status != BarcodeStatus::Unactivated {
            return Err(match barcode.status {
                BarcodeStatus::Bound | BarcodeStatus::InTransit => BarcodeError::AlreadyBound {
                    what: format!("barcode {}", barcode.code),
                },
                status => BarcodeError::InvalidState {
                    status,
                    operation: "bind",
                },
            });
        }

        let letter_id = barcode
            .letter_id
            .clone()
            .ok_or(BarcodeError::InvalidState {
                status: barcode.status,
                operation: "bind without an issued letter",
            })?;
        let mut letter =
            self.letters
                .get(&letter_id)
                .await?
                .ok_or_else(|| BarcodeError::NotFound {
                    code: letter_id.to_string(),
                })?;
        if letter.status != LetterStatus::Draft || letter.recipient_op_code.is_some() {
            return Err(BarcodeError::AlreadyBound {
                what: format!("letter {letter_id}"),
            });
        }

        let mut envelope = self
            .envelopes
            .get(&request.envelope_id)
            .await?
            .ok_or_else(|| BarcodeError::NotFound {
                code: request.envelope_id.to_string(),
            })?;
        if envelope.status != EnvelopeStatus::Unsent
            || envelope.barcode_code.is_some()
            || envelope.letter_id.is_some()
        {
            return Err(BarcodeError::AlreadyBound {
                what: format!("envelope {}", envelope.id),
            });
        }

        state::check_transition(barcode.status, BarcodeStatus::Bound, None)?;

        let now = Utc::now();
        letter.recipient_op_code = Some(request.recipient_op_code);
        letter.status = LetterStatus::InDelivery;

        envelope.barcode_code = Some(barcode.code.clone());
        envelope.letter_id = Some(letter.id.clone());
        envelope.status = EnvelopeStatus::Bound;

        barcode.envelope_id = Some(envelope.id.clone());
        barcode.recipient_op_code = Some(request.recipient_op_code);
        barcode.reveal_at = request.reveal_at;
        barcode.status = BarcodeStatus::Bound;
        barcode.bound_at = Some(now);
        barcode.last_transition_at = now;

        self.letters.put(&letter).await?;
        self.envelopes.put(&envelope).await?;
        self.barcodes.put(&barcode).await?;

        info!(
            code = %barcode.code,
            letter = %letter.id,
            envelope = %envelope.id,
            recipient = %request.recipient_op_code,
            "Barcode bound"
        );

        self.bus
            .publish(
                PlatformEvent::BarcodeBound {
                    code: barcode.code.clone(),
                    letter_id: letter.id.clone(),
                    envelope_id: envelope.id.clone(),
                    sender_op_code: letter.sender_op_code,
                    recipient_op_code: request.recipient_op_code,
                    reveal_at: request.reveal_at,
                },
                request_id,
            )
            .await;

        Ok(barcode)
    }

    /// Apply a validated scan to a barcode.
    ///
    /// The caller (the dispatch engine) has already authorized the courier
    /// at `scan.at_op_code`; this service enforces the state machine, the
    /// append-only log and per-barcode timestamp monotonicity.
    pub async fn transition(
        &self,
        scan: ScanEvent,
        code: &BarcodeCode,
        actor_level: Option<u8>,
        request_id: Option<RequestId>,
    ) -> Result<Barcode, BarcodeError> {
        let lock = self.lock_for(code);
        let _guard = lock.lock().await;

        let mut barcode = self.fetch(code).await?;
        state::check_transition(barcode.status, scan.new_status, actor_level)?;

        if let Some(last) = barcode.last_scan_at() {
            if scan.timestamp <= last {
                return Err(BarcodeError::NonMonotonicScan);
            }
        }

        let from = barcode.status;
        barcode.status = scan.new_status;
        barcode.last_transition_at = scan.timestamp;
        barcode.scan_log.push(scan.clone());
        self.barcodes.put(&barcode).await?;

        info!(
            code = %barcode.code,
            from = %from,
            to = %barcode.status,
            at = %scan.at_op_code,
            courier = %scan.courier_id,
            "Barcode transitioned"
        );

        if let Some(letter_id) = barcode.letter_id.clone() {
            self.bus
                .publish(
                    PlatformEvent::BarcodeTransitioned {
                        code: barcode.code.clone(),
                        letter_id,
                        from_status: from.as_str().to_string(),
                        to_status: barcode.status.as_str().to_string(),
                        at_op_code: Some(scan.at_op_code),
                        courier_id: Some(scan.courier_id.clone()),
                    },
                    request_id,
                )
                .await;
        }

        Ok(barcode)
    }

    /// Cancel a barcode outside the scan path (sender or staff initiated).
    pub async fn cancel(
        &self,
        code: &BarcodeCode,
        actor_level: Option<u8>,
        request_id: Option<RequestId>,
    ) -> Result<Barcode, BarcodeError> {
        let lock = self.lock_for(code);
        let _guard = lock.lock().await;

        let mut barcode = self.fetch(code).await?;
        state::check_transition(barcode.status, BarcodeStatus::Cancelled, actor_level)?;

        let from = barcode.status;
        barcode.status = BarcodeStatus::Cancelled;
        barcode.last_transition_at = Utc::now();
        self.barcodes.put(&barcode).await?;

        if let Some(letter_id) = barcode.letter_id.clone() {
            self.bus
                .publish(
                    PlatformEvent::BarcodeTransitioned {
                        code: barcode.code.clone(),
                        letter_id,
                        from_status: from.as_str().to_string(),
                        to_status: BarcodeStatus::Cancelled.as_str().to_string(),
                        at_op_code: None,
                        courier_id: None,
                    },
                    request_id,
                )
                .await;
        }

        Ok(barcode)
    }

    /// Fetch a barcode for read-only use.
    pub async fn get(&self, code: &BarcodeCode) -> Result<Barcode, BarcodeError> {
        self.fetch(code).await
    }

    /// Render the QR payload for an existing barcode, with a destination
    /// hint masked for external viewers.
    pub async fn qr_payload(&self, code: &BarcodeCode) -> Result<QrPayload, BarcodeError> {
        let barcode = self.fetch(code).await?;
        Ok(QrPayload {
            version: QR_VERSION,
            code: barcode.code.clone(),
            bound_op_hint: barcode
                .recipient_op_code
                .map(|op| mask(&op, ViewerScope::External)),
        })
    }

    /// Release barcodes whose future-letter reveal time has passed.
    ///
    /// Called by the scheduler's `future_letter_unlock` job. Clearing
    /// `reveal_at` before emitting keeps replays idempotent.
    pub async fn release_due_reveals(
        &self,
        now: DateTime<Utc>,
    ) -> Result<usize, BarcodeError> {
        let due = self.barcodes.list_reveal_due(now).await?;
        let mut released = 0;
        for mut barcode in due {
            let lock = self.lock_for(&barcode.code);
            let _guard = lock.lock().await;

            barcode.reveal_at = None;
            self.barcodes.put(&barcode).await?;
            if let Some(letter_id) = barcode.letter_id.clone() {
                self.bus
                    .publish(
                        PlatformEvent::FutureLetterUnlocked {
                            code: barcode.code.clone(),
                            letter_id,
                        },
                        None,
                    )
                    .await;
            }
            released += 1;
        }
        if released > 0 {
            info!(released, "Future letters unlocked");
        }
        Ok(released)
    }

    /// Expire draft letters older than [`DRAFT_MAX_AGE_DAYS`].
    ///
    /// Called by the scheduler's `unbound_letter_cleanup` job. Authors are
    /// notified through the bus.
    pub async fn cleanup_stale_drafts(&self, now: DateTime<Utc>) -> Result<usize, BarcodeError> {
        let cutoff = now - Duration::days(DRAFT_MAX_AGE_DAYS);
        let stale = self.letters.list_drafts_before(cutoff).await?;
        let mut expired = 0;
        for mut letter in stale {
            letter.status = LetterStatus::Expired;
            self.letters.put(&letter).await?;
            self.bus
                .publish(
                    PlatformEvent::NotificationRequested {
                        user_id: letter.author_id.clone(),
                        title: "Unsent letter expired".to_string(),
                        body: format!(
                            "Letter {} sat unbound for over {DRAFT_MAX_AGE_DAYS} days and was marked expired.",
                            letter.id
                        ),
                    },
                    None,
                )
                .await;
            expired += 1;
        }
        if expired > 0 {
            warn!(expired, "Stale draft letters expired");
        }
        Ok(expired)
    }

    async fn fetch(&self, code: &BarcodeCode) -> Result<Barcode, BarcodeError> {
        match self.barcodes.get(code).await {
            Ok(Some(barcode)) => Ok(barcode),
            Ok(None) => Err(BarcodeError::NotFound {
                code: code.to_string(),
            }),
            Err(e) => Err(BarcodeError::Storage(e)),
        }
    }
}
