use super::{
    BookingQuery, BookingStore, CommitOutcome, NotificationQuery, PageRequest, PaymentQuery,
};
use crate::models::{
    Booking, BookingKind, BookingStatus, Doctor, Hospital, Medicine, Notification, Payment,
};
use crate::services::access::BookingScope;
use crate::services::error::BookingError;
use crate::services::settlement::SettlementWrite;
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, Bson, Document},
    error::{
        Error as MongoError, ErrorKind, WriteFailure, TRANSIENT_TRANSACTION_ERROR,
        UNKNOWN_TRANSACTION_COMMIT_RESULT,
    },
    options::{
        FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument,
    },
    Client as MongoClient, Collection, Database, IndexModel,
};
use serde::Serialize;

const MAX_TRANSACTION_ATTEMPTS: u32 = 3;
const MAX_COMMIT_ATTEMPTS: u32 = 3;
const DUPLICATE_KEY_CODE: i32 = 11000;

#[derive(Clone)]
pub struct MongoStore {
    client: MongoClient,
    db: Database,
}

fn to_bson<T: Serialize>(value: &T) -> Result<Bson, BookingError> {
    mongodb::bson::to_bson(value)
        .map_err(|e| BookingError::Internal(anyhow::anyhow!("Failed to serialize value: {}", e)))
}

fn is_duplicate_key(err: &MongoError) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code == DUPLICATE_KEY_CODE,
        ErrorKind::Command(e) => e.code == DUPLICATE_KEY_CODE,
        _ => false,
    }
}

fn scope_filter(scope: &BookingScope) -> Document {
    match scope {
        BookingScope::All => doc! {},
        BookingScope::Owner(owner_id) => doc! { "owner_id": owner_id },
        BookingScope::OwnerOrDoctor {
            owner_id,
            doctor_id,
        } => doc! {
            "$or": [
                { "owner_id": owner_id },
                { "details.appointment.doctor_id": doctor_id },
            ]
        },
    }
}

fn page_options(page: &PageRequest) -> FindOptions {
    FindOptions::builder()
        .sort(doc! { "created_at": -1 })
        .skip(page.skip())
        .limit(page.limit as i64)
        .build()
}

fn named_index(keys: Document, name: &str, unique: bool) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(
            IndexOptions::builder()
                .name(name.to_string())
                .unique(unique)
                .build(),
        )
        .build()
}

impl MongoStore {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, BookingError> {
        tracing::info!("Connecting to MongoDB");
        let client = MongoClient::with_uri_str(uri).await.map_err(|e| {
            tracing::error!("Failed to connect to MongoDB: {}", e);
            BookingError::Store(e)
        })?;
        let db = client.database(database);
        tracing::info!(database = %database, "Successfully connected to MongoDB database");
        Ok(Self { client, db })
    }

    fn bookings(&self, kind: BookingKind) -> Collection<Booking> {
        self.db.collection(kind.collection())
    }

    fn payments(&self) -> Collection<Payment> {
        self.db.collection("payments")
    }

    fn notifications(&self) -> Collection<Notification> {
        self.db.collection("notifications")
    }

    fn counters(&self) -> Collection<Document> {
        self.db.collection("counters")
    }

    pub async fn initialize_indexes(&self) -> Result<(), BookingError> {
        tracing::info!("Creating MongoDB indexes for booking-service");

        for kind in BookingKind::ALL {
            let mut indexes = vec![
                named_index(doc! { "reference_number": 1 }, "reference_number_unique", true),
                named_index(
                    doc! { "owner_id": 1, "created_at": -1 },
                    "owner_created_idx",
                    false,
                ),
                named_index(doc! { "status": 1 }, "status_idx", false),
            ];
            if kind == BookingKind::Appointment {
                indexes.push(named_index(
                    doc! { "details.appointment.doctor_id": 1 },
                    "doctor_idx",
                    false,
                ));
            }
            self.bookings(kind).create_indexes(indexes, None).await?;
        }

        // At most one successful payment per booking.
        let success_per_booking = IndexModel::builder()
            .keys(doc! { "booking_type": 1, "reference_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("success_per_booking_unique".to_string())
                    .unique(true)
                    .partial_filter_expression(doc! { "status": "success" })
                    .build(),
            )
            .build();

        self.payments()
            .create_indexes(
                [
                    named_index(doc! { "gateway_order_id": 1 }, "gateway_order_unique", true),
                    named_index(doc! { "order_id": 1 }, "order_id_unique", true),
                    named_index(
                        doc! { "user_id": 1, "created_at": -1 },
                        "user_created_idx",
                        false,
                    ),
                    success_per_booking,
                ],
                None,
            )
            .await?;

        self.notifications()
            .create_index(
                named_index(
                    doc! { "user_id": 1, "created_at": -1 },
                    "user_created_idx",
                    false,
                ),
                None,
            )
            .await?;

        self.db
            .collection::<Doctor>("doctors")
            .create_index(named_index(doc! { "user_id": 1 }, "user_idx", false), None)
            .await?;

        tracing::info!("Booking service indexes initialized");
        Ok(())
    }

    async fn try_commit_settlement(
        &self,
        write: &SettlementWrite,
    ) -> Result<CommitOutcome, BookingError> {
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;

        let result = self
            .payments()
            .replace_one_with_session(
                doc! {
                    "_id": &write.payment.id,
                    "status": to_bson(&write.expected_payment_status)?,
                },
                &write.payment,
                None,
                &mut session,
            )
            .await?;
        if result.matched_count == 0 {
            session.abort_transaction().await?;
            return Ok(CommitOutcome::Conflict);
        }

        if let Some(booking_write) = &write.booking {
            let booking = &booking_write.booking;
            let result = self
                .bookings(booking.booking_type)
                .replace_one_with_session(
                    doc! {
                        "_id": &booking.id,
                        "status": to_bson(&booking_write.expected_status)?,
                        "payment_status": to_bson(&booking_write.expected_payment_status)?,
                    },
                    booking,
                    None,
                    &mut session,
                )
                .await?;
            if result.matched_count == 0 {
                session.abort_transaction().await?;
                return Ok(CommitOutcome::Conflict);
            }
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            match session.commit_transaction().await {
                Ok(()) => return Ok(CommitOutcome::Committed),
                Err(e)
                    if e.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT)
                        && attempt < MAX_COMMIT_ATTEMPTS =>
                {
                    tracing::warn!(attempt, error = %e, "Retrying transaction commit");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[async_trait]
impl BookingStore for MongoStore {
    async fn next_sequence(&self, key: &str) -> Result<u64, BookingError> {
        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();

        let mut attempt = 0;
        let counter = loop {
            attempt += 1;
            match self
                .counters()
                .find_one_and_update(
                    doc! { "_id": key },
                    doc! { "$inc": { "seq": 1_i64 } },
                    options.clone(),
                )
                .await
            {
                Ok(counter) => break counter,
                // Two first-ever upserts for the same key race; the loser retries as an update.
                Err(e) if is_duplicate_key(&e) && attempt < 2 => continue,
                Err(e) => return Err(e.into()),
            }
        };

        let seq = counter
            .as_ref()
            .and_then(|c| match c.get("seq") {
                Some(Bson::Int64(v)) => Some(*v),
                Some(Bson::Int32(v)) => Some(i64::from(*v)),
                _ => None,
            })
            .ok_or_else(|| {
                BookingError::Internal(anyhow::anyhow!("Counter {} returned no sequence", key))
            })?;

        u64::try_from(seq)
            .map_err(|_| BookingError::Internal(anyhow::anyhow!("Counter {} is negative", key)))
    }

    async fn insert_booking(&self, booking: &Booking) -> Result<(), BookingError> {
        self.bookings(booking.booking_type)
            .insert_one(booking, None)
            .await?;
        Ok(())
    }

    async fn get_booking(
        &self,
        kind: BookingKind,
        id: &str,
    ) -> Result<Option<Booking>, BookingError> {
        Ok(self.bookings(kind).find_one(doc! { "_id": id }, None).await?)
    }

    async fn list_bookings(
        &self,
        kind: BookingKind,
        query: &BookingQuery,
    ) -> Result<(Vec<Booking>, u64), BookingError> {
        let mut filter = scope_filter(&query.scope);
        if let Some(status) = query.status {
            filter.insert("status", to_bson(&status)?);
        }

        let collection = self.bookings(kind);
        let total = collection.count_documents(filter.clone(), None).await?;
        let cursor = collection.find(filter, page_options(&query.page)).await?;
        let bookings: Vec<Booking> = cursor.try_collect().await?;
        Ok((bookings, total))
    }

    async fn replace_booking_if_status(
        &self,
        booking: &Booking,
        expected: BookingStatus,
    ) -> Result<bool, BookingError> {
        let result = self
            .bookings(booking.booking_type)
            .replace_one(
                doc! { "_id": &booking.id, "status": to_bson(&expected)? },
                booking,
                None,
            )
            .await?;
        Ok(result.matched_count == 1)
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<(), BookingError> {
        self.payments().insert_one(payment, None).await?;
        Ok(())
    }

    async fn get_payment(&self, id: &str) -> Result<Option<Payment>, BookingError> {
        Ok(self.payments().find_one(doc! { "_id": id }, None).await?)
    }

    async fn find_payment_by_gateway_order(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<Payment>, BookingError> {
        Ok(self
            .payments()
            .find_one(doc! { "gateway_order_id": gateway_order_id }, None)
            .await?)
    }

    async fn list_payments(
        &self,
        query: &PaymentQuery,
    ) -> Result<(Vec<Payment>, u64), BookingError> {
        let mut filter = doc! {};
        if let Some(user_id) = &query.user_id {
            filter.insert("user_id", user_id);
        }
        if let Some(kind) = query.booking_type {
            filter.insert("booking_type", to_bson(&kind)?);
        }
        if let Some(status) = query.status {
            filter.insert("status", to_bson(&status)?);
        }

        let total = self.payments().count_documents(filter.clone(), None).await?;
        let cursor = self.payments().find(filter, page_options(&query.page)).await?;
        let payments: Vec<Payment> = cursor.try_collect().await?;
        Ok((payments, total))
    }

    async fn commit_settlement(
        &self,
        write: &SettlementWrite,
    ) -> Result<CommitOutcome, BookingError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_commit_settlement(write).await {
                Err(BookingError::Store(e))
                    if e.contains_label(TRANSIENT_TRANSACTION_ERROR)
                        && attempt < MAX_TRANSACTION_ATTEMPTS =>
                {
                    tracing::warn!(
                        attempt,
                        payment_id = %write.payment.id,
                        error = %e,
                        "Transient transaction error, retrying settlement"
                    );
                }
                // The partial unique index rejected a second successful payment.
                Err(BookingError::Store(e)) if is_duplicate_key(&e) => {
                    return Ok(CommitOutcome::Conflict)
                }
                other => return other,
            }
        }
    }

    async fn find_doctor(&self, id: &str) -> Result<Option<Doctor>, BookingError> {
        Ok(self
            .db
            .collection::<Doctor>("doctors")
            .find_one(doc! { "_id": id }, None)
            .await?)
    }

    async fn find_doctor_by_user_id(&self, user_id: &str) -> Result<Option<Doctor>, BookingError> {
        Ok(self
            .db
            .collection::<Doctor>("doctors")
            .find_one(doc! { "user_id": user_id }, None)
            .await?)
    }

    async fn find_hospital(&self, id: &str) -> Result<Option<Hospital>, BookingError> {
        Ok(self
            .db
            .collection::<Hospital>("hospitals")
            .find_one(doc! { "_id": id }, None)
            .await?)
    }

    async fn find_medicine(&self, id: &str) -> Result<Option<Medicine>, BookingError> {
        Ok(self
            .db
            .collection::<Medicine>("medicines")
            .find_one(doc! { "_id": id }, None)
            .await?)
    }

    async fn insert_notification(&self, notification: &Notification) -> Result<(), BookingError> {
        self.notifications().insert_one(notification, None).await?;
        Ok(())
    }

    async fn list_notifications(
        &self,
        query: &NotificationQuery,
    ) -> Result<(Vec<Notification>, u64), BookingError> {
        let mut filter = doc! { "user_id": &query.user_id };
        if query.unread_only {
            filter.insert("is_read", false);
        }

        let total = self
            .notifications()
            .count_documents(filter.clone(), None)
            .await?;
        let cursor = self
            .notifications()
            .find(filter, page_options(&query.page))
            .await?;
        let notifications: Vec<Notification> = cursor.try_collect().await?;
        Ok((notifications, total))
    }

    async fn mark_notification_read(
        &self,
        user_id: &str,
        id: &str,
    ) -> Result<Option<Notification>, BookingError> {
        // read_at keeps the first read time.
        self.notifications()
            .update_one(
                doc! { "_id": id, "user_id": user_id, "is_read": false },
                doc! {
                    "$set": {
                        "is_read": true,
                        "read_at": mongodb::bson::DateTime::now(),
                    }
                },
                None,
            )
            .await?;

        Ok(self
            .notifications()
            .find_one(doc! { "_id": id, "user_id": user_id }, None)
            .await?)
    }

    async fn health_check(&self) -> Result<(), BookingError> {
        self.db.run_command(doc! { "ping": 1 }, None).await?;
        Ok(())
    }
}
