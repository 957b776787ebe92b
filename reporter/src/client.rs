use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use metrics::counter;
use tracing::{info, warn};

use crate::config::{
    AsyncBatchConfig, BatchConfig, Config, ConsumerMode, DebugConfig, LoggingConfig,
};
use crate::consumer::{complete, Consumer};
use crate::consumers::{AsyncBatchConsumer, BatchConsumer, DebugConsumer, LoggingConsumer};
use crate::error::{ConfigError, ReportError};
use crate::event::{
    Callback, RecordInput, TrackEvent, TrackFirstEvent, TrackOverwriteEvent, TrackUpdateEvent,
    UserEvent, UserUnsetEvent,
};
use crate::properties::Properties;
use crate::record::{DynamicPropertiesProvider, EventNormalizer, EventType};
use crate::time::{SystemTime, TimeSource};
use crate::validation::{is_valid_name, ValidationConfig, Validator};

/// Entry point for reporting events.
///
/// Every operation validates its request, builds a record and hands it to the consumer chosen
/// at construction. Nothing is returned: the outcome, including validation failures, is passed
/// to the request's callback, or logged when there is none.
pub struct Analytics {
    consumer: Arc<dyn Consumer + Send + Sync>,
    validator: Validator,
    normalizer: EventNormalizer,
    super_properties: RwLock<Arc<Properties>>,
    dynamic_super_properties: RwLock<Option<DynamicPropertiesProvider>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| {
        warn!("poisoned super properties lock");
        poisoned.into_inner()
    })
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| {
        warn!("poisoned super properties lock");
        poisoned.into_inner()
    })
}

fn is_present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}

impl Analytics {
    pub fn new(consumer: impl Consumer + Send + Sync + 'static) -> Self {
        Self {
            consumer: Arc::new(consumer),
            validator: Validator::default(),
            normalizer: EventNormalizer::new(Arc::new(SystemTime {})),
            super_properties: RwLock::new(Arc::new(Properties::new())),
            dynamic_super_properties: RwLock::new(None),
        }
    }

    pub fn with_validation(mut self, config: ValidationConfig) -> Self {
        self.validator = Validator::new(config);
        self
    }

    /// Replace the clock used to stamp records that carry no time of their own.
    pub fn with_timesource(mut self, timesource: Arc<dyn TimeSource + Send + Sync>) -> Self {
        self.normalizer = EventNormalizer::new(timesource);
        self
    }

    /// Report every record immediately to the receiver's validation endpoint.
    pub fn debug(server_url: &str, app_id: &str, config: DebugConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(DebugConsumer::new(server_url, app_id, config)?))
    }

    pub fn batch(server_url: &str, app_id: &str, config: BatchConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(BatchConsumer::new(server_url, app_id, config)?))
    }

    /// Must be called from within a tokio runtime.
    pub fn async_batch(
        server_url: &str,
        app_id: &str,
        config: AsyncBatchConfig,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(AsyncBatchConsumer::new(server_url, app_id, config)?))
    }

    pub fn logging(directory: impl AsRef<Path>, config: LoggingConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(LoggingConsumer::new(directory, config)?))
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        info!(mode = ?config.mode, "starting event reporter");
        match config.mode {
            ConsumerMode::Debug => Self::debug(
                config.server_url()?,
                config.app_id()?,
                config.debug_config(),
            ),
            ConsumerMode::Batch => Self::batch(
                config.server_url()?,
                config.app_id()?,
                config.batch_config(),
            ),
            ConsumerMode::AsyncBatch => Self::async_batch(
                config.server_url()?,
                config.app_id()?,
                config.async_batch_config(),
            ),
            ConsumerMode::Logging => {
                Self::logging(config.log_directory()?, config.logging_config())
            }
        }
    }

    /// Report an ordinary event.
    pub async fn track(&self, event: TrackEvent) {
        self.track_with(event, false).await
    }

    /// Like [`Analytics::track`], but properties are sent as given, without the name and
    /// value checks. Identity and event name are still checked.
    pub async fn track_unchecked(&self, event: TrackEvent) {
        self.track_with(event, true).await
    }

    async fn track_with(&self, event: TrackEvent, skip_properties_check: bool) {
        let (mut input, callback) = event.into_parts();
        let check = self.check_track(&mut input, skip_properties_check);
        self.submit(EventType::Track, input, callback, check).await
    }

    /// Report an event the receiver keeps only once per first-check id.
    pub async fn track_first(&self, event: TrackFirstEvent) {
        self.track_first_with(event, false).await
    }

    /// [`Analytics::track_first`] without the property checks.
    pub async fn track_first_unchecked(&self, event: TrackFirstEvent) {
        self.track_first_with(event, true).await
    }

    async fn track_first_with(&self, event: TrackFirstEvent, skip_properties_check: bool) {
        let (mut input, callback) = event.track.into_parts();
        input.first_check_id = event.first_check_id;

        let check = self
            .check_track(&mut input, skip_properties_check)
            .and_then(|_| {
                if is_present(&input.first_check_id) {
                    Ok(())
                } else {
                    Err(ReportError::MissingFirstCheckId)
                }
            });
        self.submit(EventType::Track, input, callback, check).await
    }

    pub async fn track_update(&self, event: TrackUpdateEvent) {
        let (input, callback) = event.track.into_parts();
        self.track_mutable(EventType::TrackUpdate, input, event.event_id, callback, false)
            .await
    }

    pub async fn track_update_unchecked(&self, event: TrackUpdateEvent) {
        let (input, callback) = event.track.into_parts();
        self.track_mutable(EventType::TrackUpdate, input, event.event_id, callback, true)
            .await
    }

    pub async fn track_overwrite(&self, event: TrackOverwriteEvent) {
        let (input, callback) = event.track.into_parts();
        self.track_mutable(EventType::TrackOverwrite, input, event.event_id, callback, false)
            .await
    }

    pub async fn track_overwrite_unchecked(&self, event: TrackOverwriteEvent) {
        let (input, callback) = event.track.into_parts();
        self.track_mutable(EventType::TrackOverwrite, input, event.event_id, callback, true)
            .await
    }

    async fn track_mutable(
        &self,
        event_type: EventType,
        mut input: RecordInput,
        event_id: Option<String>,
        callback: Option<Callback>,
        skip_properties_check: bool,
    ) {
        input.event_id = event_id;
        let check = self
            .check_track(&mut input, skip_properties_check)
            .and_then(|_| {
                if is_present(&input.event_id) {
                    Ok(())
                } else {
                    Err(ReportError::MissingEventId)
                }
            });
        self.submit(event_type, input, callback, check).await
    }

    /// Set user properties, overwriting existing values.
    pub async fn user_set(&self, event: UserEvent) {
        self.user_update(EventType::UserSet, event).await
    }

    /// Set user properties that have no value yet.
    pub async fn user_set_once(&self, event: UserEvent) {
        self.user_update(EventType::UserSetOnce, event).await
    }

    /// Add numeric deltas to user properties.
    pub async fn user_add(&self, event: UserEvent) {
        self.user_update(EventType::UserAdd, event).await
    }

    pub async fn user_append(&self, event: UserEvent) {
        self.user_update(EventType::UserAppend, event).await
    }

    /// Append to list properties, skipping values already present.
    pub async fn user_uniq_append(&self, event: UserEvent) {
        self.user_update(EventType::UserUniqAppend, event).await
    }

    async fn user_update(&self, event_type: EventType, event: UserEvent) {
        let (mut input, callback) = event.into_parts();
        let check = self.check_identity(&input).and_then(|_| {
            if self.validator.are_properties_required(input.properties.as_mut()) {
                Ok(())
            } else {
                Err(ReportError::InvalidProperties)
            }
        });
        self.submit(event_type, input, callback, check).await
    }

    pub async fn user_unset(&self, event: UserUnsetEvent) {
        let property = event.property.clone();
        let (input, callback) = event.into_parts();

        let check = self.check_identity(&input).and_then(|_| {
            if is_valid_name(&property) {
                Ok(())
            } else {
                Err(ReportError::InvalidPropertyName(property))
            }
        });
        self.submit(EventType::UserUnset, input, callback, check).await
    }

    /// Delete the user. Only the identity is checked; malformed properties are left out.
    pub async fn user_del(&self, event: UserEvent) {
        let (mut input, callback) = event.into_parts();
        let check = self.check_identity(&input);

        if check.is_ok()
            && input.properties.is_some()
            && !self
                .validator
                .are_properties_well_formed(input.properties.as_mut())
        {
            warn!("dropping malformed properties from user_del");
            input.properties = None;
        }
        self.submit(EventType::UserDel, input, callback, check).await
    }

    /// Merge `properties` into the set attached to every track event. Nothing is merged if
    /// any key is invalid.
    pub fn set_super_properties(&self, mut properties: Properties, callback: Option<Callback>) {
        if !self.validator.are_properties_well_formed(Some(&mut properties)) {
            return self.reject(callback, ReportError::InvalidSuperProperties);
        }

        let mut current = write(&self.super_properties);
        let mut merged = Properties::clone(&current);
        merged.extend(properties);
        *current = Arc::new(merged);
        drop(current);

        complete(callback, Ok(()));
    }

    pub fn clear_super_properties(&self) {
        *write(&self.super_properties) = Arc::new(Properties::new());
    }

    /// Snapshot of the static super properties.
    pub fn super_properties(&self) -> Properties {
        Properties::clone(&read(&self.super_properties))
    }

    /// Install a provider called for every track event. Its properties override the static
    /// super properties. The provider is called once here and rejected if that output is
    /// not a well-formed property map.
    pub fn set_dynamic_super_properties(
        &self,
        provider: impl Fn() -> Properties + Send + Sync + 'static,
        callback: Option<Callback>,
    ) {
        let mut sample = provider();
        if !self.validator.are_properties_well_formed(Some(&mut sample)) {
            return self.reject(callback, ReportError::InvalidDynamicSuperProperties);
        }

        *write(&self.dynamic_super_properties) = Some(Arc::new(provider));
        complete(callback, Ok(()));
    }

    pub async fn flush(&self, callback: Option<Callback>) {
        info!("flush by manual");
        self.consumer.flush(callback).await
    }

    /// Deliver anything still buffered and release the consumer. Later events are refused.
    pub async fn close(&self, callback: Option<Callback>) {
        info!("closing event reporter");
        self.consumer.close(callback).await
    }

    fn check_identity(&self, input: &RecordInput) -> Result<(), ReportError> {
        if self
            .validator
            .has_valid_user_identity(input.account_id.as_deref(), input.distinct_id.as_deref())
        {
            Ok(())
        } else {
            Err(ReportError::MissingIdentity)
        }
    }

    fn check_track(
        &self,
        input: &mut RecordInput,
        skip_properties_check: bool,
    ) -> Result<(), ReportError> {
        self.check_identity(input)?;

        if !input.event_name.as_deref().is_some_and(is_valid_name) {
            return Err(ReportError::InvalidEventName);
        }

        if !skip_properties_check
            && !self
                .validator
                .are_properties_well_formed(input.properties.as_mut())
        {
            return Err(ReportError::InvalidProperties);
        }
        Ok(())
    }

    async fn submit(
        &self,
        event_type: EventType,
        input: RecordInput,
        callback: Option<Callback>,
        check: Result<(), ReportError>,
    ) {
        if let Err(e) = check {
            return self.reject(callback, e);
        }

        let (super_properties, dynamic) = if event_type.is_track() {
            (
                read(&self.super_properties).clone(),
                read(&self.dynamic_super_properties).clone(),
            )
        } else {
            (Arc::default(), None)
        };

        let record = self
            .normalizer
            .build(event_type, input, &super_properties, dynamic.as_ref());
        counter!("reporter_events_enqueued_total", "type" => event_type.as_str()).increment(1);

        self.consumer.add(record, callback).await
    }

    fn reject(&self, callback: Option<Callback>, error: ReportError) {
        counter!("reporter_events_rejected_total", "reason" => error.reason()).increment(1);
        complete(callback, Err(error));
    }
}
