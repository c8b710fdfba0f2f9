//! Ledger Engine.
//!
//! Every balance mutation is an atomic relative increment committed in the
//! same single-partition batch as the log write it accounts for, so the
//! cached `Student::balance` equals the sum of that student's transactions
//! whenever no batch is in flight. `adjust_balance` is the one deliberate
//! exception and is audited as out-of-band.
//!
//! Audit records go to the `schoolbank::audit` target with a `ledger_effect`
//! field of `logged` or `out_of_band`.

use serde::Serialize;
use tracing::{info, instrument, warn};

use schoolbank_auth::{EffectiveScope, Permission, authorize, authorize_any};
use schoolbank_core::{
    ClassId, DomainError, DomainResult, Entity, ErrorKind, RewardId, RewardRequestId, StudentId,
    TransactionId,
};
use schoolbank_ledger::{
    Award, RequestTransition, Reward, RewardRequest, Student, Transaction, TransactionUpdate,
};

use crate::document_store::{
    Document, DocumentStore, Precondition, StoreError, WriteBatch, WriteOp, encode,
};
use crate::repository::{TenantRepository, entity_error, with_stamp};

const BALANCE: &str = "balance";
const TIMESTAMP: &str = "timestamp";

/// Permissions accepted for awarding and redemption handling.
const AWARD_PERMISSIONS: [Permission; 2] = [Permission::GIVE_REWARDS, Permission::MANAGE_STUDENTS];

/// A committed award: the log row and the balance it produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GiveResult {
    pub transaction: Transaction,
    pub new_balance: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassAwardFailure {
    pub student_id: StudentId,
    pub error: ErrorKind,
    pub message: String,
    pub retryable: bool,
}

/// Best-effort outcome of a class-wide award.
///
/// Students are awarded one at a time, in name order. The first failure stops
/// the run; students after it are listed in `not_attempted`. Re-running the
/// award re-applies it, so callers retrying must target only the students
/// that did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassAwardReport {
    pub completed: Vec<GiveResult>,
    pub failed: Option<ClassAwardFailure>,
    pub not_attempted: Vec<StudentId>,
}

impl ClassAwardReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_none() && self.not_attempted.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Approval {
    pub request: RewardRequest,
    pub redemption: GiveResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reversal {
    pub transaction_id: TransactionId,
    pub student_id: StudentId,
    /// `None` when the student no longer exists.
    pub new_balance: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct LedgerEngine<S> {
    store: S,
}

impl<S> LedgerEngine<S>
where
    S: DocumentStore + Clone,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    fn repo(&self, scope: &EffectiveScope) -> DomainResult<TenantRepository<S>> {
        TenantRepository::for_scope(self.store.clone(), scope)
    }

    /// Award (positive) or deduct (negative) points for one student.
    #[instrument(skip(self, scope, award), fields(user_id = %scope.user_id(), student_id = %student_id), err)]
    pub async fn give(
        &self,
        scope: &EffectiveScope,
        student_id: &StudentId,
        award: Award,
    ) -> DomainResult<GiveResult> {
        authorize_any(scope, &AWARD_PERMISSIONS)?;
        let repo = self.repo(scope)?;
        let student: Student = repo.get(student_id).await?;
        let result = self.commit_award(&repo, scope, &student, &award, WriteBatch::new()).await?;
        audit_logged("give", &repo, &result);
        Ok(result)
    }

    /// Award every student of a class, sequentially and independently.
    ///
    /// Not atomic across students: see [`ClassAwardReport`].
    #[instrument(skip(self, scope, award), fields(user_id = %scope.user_id(), class_id = %class_id), err)]
    pub async fn give_to_class(
        &self,
        scope: &EffectiveScope,
        class_id: &ClassId,
        award: Award,
    ) -> DomainResult<ClassAwardReport> {
        authorize_any(scope, &AWARD_PERMISSIONS)?;
        let repo = self.repo(scope)?;
        let students = repo.students(Some(class_id)).await?;

        let mut report = ClassAwardReport {
            completed: Vec::with_capacity(students.len()),
            failed: None,
            not_attempted: Vec::new(),
        };
        let mut remaining = students.into_iter();
        for student in remaining.by_ref() {
            match self.commit_award(&repo, scope, &student, &award, WriteBatch::new()).await {
                Ok(result) => {
                    audit_logged("give_to_class", &repo, &result);
                    report.completed.push(result);
                }
                Err(err) => {
                    warn!(
                        class_id = %class_id,
                        student_id = %student.id,
                        error = %err,
                        completed = report.completed.len(),
                        "class award stopped partway"
                    );
                    report.failed = Some(ClassAwardFailure {
                        student_id: student.id.clone(),
                        error: err.kind(),
                        message: err.to_string(),
                        retryable: err.is_retryable(),
                    });
                    break;
                }
            }
        }
        report.not_attempted = remaining.map(|s| s.id).collect();
        Ok(report)
    }

    /// Open a `pending` redemption request for an active reward.
    pub async fn request_reward(
        &self,
        scope: &EffectiveScope,
        student_id: &StudentId,
        reward_id: &RewardId,
    ) -> DomainResult<RewardRequest> {
        authorize_any(scope, &AWARD_PERMISSIONS)?;
        let repo = self.repo(scope)?;
        repo.get::<Student>(student_id).await?;
        let reward: Reward = repo.get(reward_id).await?;
        if !reward.active {
            return Err(DomainError::invalid_argument(format!(
                "reward '{}' is not available",
                reward.name
            )));
        }

        let request = RewardRequest::pending(
            RewardRequestId::generate(),
            student_id.clone(),
            reward_id.clone(),
        );
        let path = repo.doc_path::<RewardRequest>(&request.id);
        let fields = encode(&request)?;
        let result = self
            .store
            .commit(WriteBatch::new().with(WriteOp::create(path.clone(), fields.clone()).stamped("requestedAt")))
            .await?;
        let doc = Document {
            path,
            fields: with_stamp(fields, "requestedAt", result.commit_time),
        };
        Ok(doc.decode()?)
    }

    /// Approve a pending request: the redemption award, its log row and the
    /// state transition commit as one batch guarded by `status == pending`.
    #[instrument(skip(self, scope), fields(user_id = %scope.user_id(), request_id = %request_id), err)]
    pub async fn approve(
        &self,
        scope: &EffectiveScope,
        request_id: &RewardRequestId,
    ) -> DomainResult<Approval> {
        authorize_any(scope, &AWARD_PERMISSIONS)?;
        let repo = self.repo(scope)?;
        let request: RewardRequest = repo.get(request_id).await?;
        let transition = request.approve(scope.user_id().clone())?;
        let reward: Reward = repo.get(&request.reward_id).await?;
        let student: Student = repo.get(&request.student_id).await?;

        if let Some(max_debt) = repo.school().await?.config.max_debt {
            let after = student
                .balance
                .checked_sub(reward.cost)
                .ok_or_else(|| balance_overflow(&student.id))?;
            if after < max_debt.saturating_neg() {
                return Err(DomainError::invalid_argument(format!(
                    "balance {} cannot cover '{}' ({})",
                    student.balance, reward.name, reward.cost
                )));
            }
        }

        let guard = WriteBatch::new().with(
            WriteOp::update(repo.doc_path::<RewardRequest>(request_id), transition.fields())
                .stamped(transition.timestamp_field())
                .when(Precondition::field_equals("status", "pending")),
        );
        let award = Award::redemption(&reward);
        let redemption = self
            .commit_award(&repo, scope, &student, &award, guard)
            .await
            .map_err(|err| match err {
                DomainError::InvalidRequestState(_) => DomainError::invalid_request_state(format!(
                    "request {request_id} is no longer pending"
                )),
                other => other,
            })?;
        audit_logged("approve", &repo, &redemption);

        let request = RewardRequest {
            status: transition.target(),
            approved_at: redemption.transaction.timestamp,
            approved_by: Some(scope.user_id().clone()),
            ..request
        };
        Ok(Approval { request, redemption })
    }

    /// Reject a pending request; no balance effect.
    pub async fn reject(
        &self,
        scope: &EffectiveScope,
        request_id: &RewardRequestId,
        reason: Option<String>,
    ) -> DomainResult<RewardRequest> {
        authorize_any(scope, &AWARD_PERMISSIONS)?;
        let repo = self.repo(scope)?;
        let request: RewardRequest = repo.get(request_id).await?;
        let transition = request.reject(scope.user_id().clone(), reason)?;

        let batch = WriteBatch::new().with(
            WriteOp::update(repo.doc_path::<RewardRequest>(request_id), transition.fields())
                .stamped(transition.timestamp_field())
                .when(Precondition::field_equals("status", "pending")),
        );
        let result = self.store.commit(batch).await.map_err(|err| match err {
            StoreError::PreconditionFailed(_) => DomainError::invalid_request_state(format!(
                "request {request_id} is no longer pending"
            )),
            other => entity_error::<RewardRequest>(other),
        })?;

        let rejection_reason = match &transition {
            RequestTransition::Reject { reason, .. } => reason.clone(),
            RequestTransition::Approve { .. } => None,
        };
        info!(request_id = %request_id, "reward request rejected");
        Ok(RewardRequest {
            status: transition.target(),
            rejected_at: Some(result.commit_time),
            rejected_by: Some(scope.user_id().clone()),
            rejection_reason,
            ..request
        })
    }

    /// Reverse a log row: decrement the balance by its amount and delete it,
    /// in one batch.
    #[instrument(skip(self, scope), fields(user_id = %scope.user_id(), transaction_id = %id), err)]
    pub async fn delete_transaction(
        &self,
        scope: &EffectiveScope,
        id: &TransactionId,
    ) -> DomainResult<Reversal> {
        authorize(scope, &Permission::MANAGE_STUDENTS)?;
        let repo = self.repo(scope)?;
        let tx: Transaction = repo.get(id).await?;
        let reversal = tx
            .amount
            .checked_neg()
            .ok_or_else(|| balance_overflow(&tx.student_id))?;
        let tx_path = repo.doc_path::<Transaction>(id);
        let student_path = repo.doc_path::<Student>(&tx.student_id);

        if repo.find::<Student>(&tx.student_id).await?.is_none() {
            self.store.commit(WriteBatch::new().with(WriteOp::delete(tx_path))).await?;
            warn!(transaction_id = %id, student_id = %tx.student_id, "removed transaction of a deleted student");
            return Ok(Reversal {
                transaction_id: id.clone(),
                student_id: tx.student_id,
                new_balance: None,
            });
        }

        let batch = WriteBatch::new()
            .with(WriteOp::increment(student_path.clone(), BALANCE, reversal))
            .with(WriteOp::delete(tx_path));
        let result = self.store.commit(batch).await.map_err(entity_error::<Student>)?;
        let new_balance = result.incremented(&student_path, BALANCE);

        info!(
            target: "schoolbank::audit",
            ledger_effect = "logged",
            operation = "delete_transaction",
            school_id = %repo.school_id(),
            student_id = %tx.student_id,
            transaction_id = %id,
            amount = reversal,
            new_balance = ?new_balance,
            "ledger mutation"
        );
        Ok(Reversal {
            transaction_id: id.clone(),
            student_id: tx.student_id,
            new_balance,
        })
    }

    /// Edit a log row. A changed amount re-derives the type and applies the
    /// delta to the balance in the same batch.
    #[instrument(skip(self, scope, update), fields(user_id = %scope.user_id(), transaction_id = %id), err)]
    pub async fn update_transaction(
        &self,
        scope: &EffectiveScope,
        id: &TransactionId,
        update: TransactionUpdate,
    ) -> DomainResult<Transaction> {
        authorize(scope, &Permission::MANAGE_STUDENTS)?;
        if update.is_empty() {
            return Err(DomainError::invalid_argument("nothing to update"));
        }
        let repo = self.repo(scope)?;
        let tx: Transaction = repo.get(id).await?;

        let mut fields = update.metadata_fields()?;
        let delta = match update.amount {
            Some(amount) if amount != tx.amount => {
                fields.extend(TransactionUpdate::amount_fields(amount)?);
                amount
                    .checked_sub(tx.amount)
                    .ok_or_else(|| balance_overflow(&tx.student_id))?
            }
            _ => 0,
        };

        let mut batch = WriteBatch::new();
        if delta != 0 {
            batch.push(WriteOp::increment(
                repo.doc_path::<Student>(&tx.student_id),
                BALANCE,
                delta,
            ));
        }
        batch.push(WriteOp::update(repo.doc_path::<Transaction>(id), fields).stamped("updatedAt"));
        let students = repo.collection::<Student>().to_string();
        self.store.commit(batch).await.map_err(|err| match err {
            StoreError::NotFound(path) if path.starts_with(&students) => {
                DomainError::NotFound(Student::KIND)
            }
            other => entity_error::<Transaction>(other),
        })?;

        if delta != 0 {
            info!(
                target: "schoolbank::audit",
                ledger_effect = "logged",
                operation = "update_transaction",
                school_id = %repo.school_id(),
                student_id = %tx.student_id,
                transaction_id = %id,
                amount = delta,
                "ledger mutation"
            );
        }
        repo.get(id).await
    }

    /// Out-of-band correction: moves the balance with no log row, so the
    /// balance stops matching the log by exactly `delta`.
    #[instrument(skip(self, scope), fields(user_id = %scope.user_id(), student_id = %student_id), err)]
    pub async fn adjust_balance(
        &self,
        scope: &EffectiveScope,
        student_id: &StudentId,
        delta: i64,
    ) -> DomainResult<i64> {
        authorize(scope, &Permission::MANAGE_STUDENTS)?;
        if delta == 0 {
            return Err(DomainError::invalid_argument("delta must not be zero"));
        }
        let repo = self.repo(scope)?;
        let path = repo.doc_path::<Student>(student_id);
        let result = self
            .store
            .commit(WriteBatch::new().with(WriteOp::increment(path.clone(), BALANCE, delta)))
            .await
            .map_err(entity_error::<Student>)?;
        let new_balance = result
            .incremented(&path, BALANCE)
            .ok_or_else(|| DomainError::internal("store did not report the new balance"))?;

        warn!(
            target: "schoolbank::audit",
            ledger_effect = "out_of_band",
            operation = "adjust_balance",
            school_id = %repo.school_id(),
            student_id = %student_id,
            user_id = %scope.user_id(),
            amount = delta,
            new_balance,
            "ledger mutation"
        );
        Ok(new_balance)
    }

    /// Append `Increment(balance) + Create(transaction)` to `batch` and commit.
    async fn commit_award(
        &self,
        repo: &TenantRepository<S>,
        scope: &EffectiveScope,
        student: &Student,
        award: &Award,
        mut batch: WriteBatch,
    ) -> DomainResult<GiveResult> {
        let mut tx = award.to_transaction(
            TransactionId::generate(),
            student,
            scope.user_id(),
            scope.display_name(),
        );
        let student_path = repo.doc_path::<Student>(&student.id);
        batch.push(WriteOp::increment(student_path.clone(), BALANCE, award.amount));
        batch.push(
            WriteOp::create(repo.doc_path::<Transaction>(&tx.id), encode(&tx)?).stamped(TIMESTAMP),
        );

        let result = repo.store().commit(batch).await.map_err(|err| match err {
            StoreError::NotFound(_) => DomainError::NotFound(Student::KIND),
            other => other.into(),
        })?;
        let new_balance = result
            .incremented(&student_path, BALANCE)
            .ok_or_else(|| DomainError::internal("store did not report the new balance"))?;
        tx.timestamp = Some(result.commit_time);
        Ok(GiveResult {
            transaction: tx,
            new_balance,
        })
    }
}

fn audit_logged<S: DocumentStore>(operation: &'static str, repo: &TenantRepository<S>, result: &GiveResult) {
    info!(
        target: "schoolbank::audit",
        ledger_effect = "logged",
        operation,
        school_id = %repo.school_id(),
        student_id = %result.transaction.student_id,
        transaction_id = %result.transaction.id,
        amount = result.transaction.amount,
        new_balance = result.new_balance,
        "ledger mutation"
    );
}

fn balance_overflow(student_id: &StudentId) -> DomainError {
    DomainError::invalid_argument(format!("balance change for student {student_id} is out of range"))
}
