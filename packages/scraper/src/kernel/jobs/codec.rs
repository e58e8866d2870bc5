//! Codec registry: bidirectional mapping between job variants and the
//! persisted envelope.
//!
//! One codec per `payload_type` tag. The registry is the only place that
//! knows how to turn a `payload` column back into a typed job, so the
//! metadata key set of each codec is the bit-level contract between worker
//! processes.

use std::collections::HashMap;

use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::envelope::{CodecError, JobEnvelope};
use super::row::JobPriority;
use crate::domains::gmaps::{
    BodaccJob, CrawlJob, EmailJob, Entry, JobCore, PappersJob, PlaceJob, SearchJob,
};

/// Encoding/decoding for one job variant.
pub trait JobCodec: Send + Sync {
    /// The `payload_type` tag this codec owns.
    fn job_type(&self) -> &'static str;

    fn encode(&self, job: &CrawlJob) -> Result<JobEnvelope, CodecError>;

    fn decode(&self, envelope: &JobEnvelope) -> Result<CrawlJob, CodecError>;
}

/// Registry of all supported codecs, keyed by tag.
pub struct CodecRegistry {
    codecs: HashMap<&'static str, Box<dyn JobCodec>>,
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CodecRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            codecs: HashMap::new(),
        };
        registry.register(Box::new(SearchJobCodec));
        registry.register(Box::new(PlaceJobCodec));
        registry.register(Box::new(EmailJobCodec));
        registry.register(Box::new(BodaccJobCodec));
        registry.register(Box::new(PappersJobCodec));
        registry
    }

    pub fn register(&mut self, codec: Box<dyn JobCodec>) {
        self.codecs.insert(codec.job_type(), codec);
    }

    pub fn get(&self, job_type: &str) -> Option<&dyn JobCodec> {
        self.codecs.get(job_type).map(Box::as_ref)
    }

    /// Encode a job. Fails when no codec is registered for its variant.
    pub fn encode(&self, job: &CrawlJob) -> Result<(JobEnvelope, &'static str), CodecError> {
        let tag = job.job_type();
        let codec = self
            .get(tag)
            .ok_or_else(|| CodecError::UnknownPayloadType(tag.to_string()))?;
        Ok((codec.encode(job)?, tag))
    }

    /// Decode a stored payload by its discriminator tag.
    pub fn decode(&self, payload_type: &str, payload: &Value) -> Result<CrawlJob, CodecError> {
        let codec = self
            .get(payload_type)
            .ok_or_else(|| CodecError::UnknownPayloadType(payload_type.to_string()))?;
        let envelope = JobEnvelope::from_payload(payload)?;
        codec.decode(&envelope)
    }
}

// ============================================================================
// Core <-> envelope mapping shared by all codecs
// ============================================================================

fn envelope_from_core(core: &JobCore, job_type: &str, metadata: Map<String, Value>) -> JobEnvelope {
    JobEnvelope {
        id: core.id.to_string(),
        priority: core.priority.as_i16(),
        url: core.url.clone(),
        url_params: core.url_params.clone(),
        max_retries: core.max_retries as i32,
        job_type: job_type.to_string(),
        parent_id: core.parent_id.map(|id| id.to_string()),
        metadata,
    }
}

fn core_from_envelope(envelope: &JobEnvelope) -> Result<JobCore, CodecError> {
    let id = Uuid::parse_str(&envelope.id)
        .map_err(|e| CodecError::envelope("id", e.to_string()))?;

    let parent_id = match &envelope.parent_id {
        Some(raw) if !raw.is_empty() => Some(
            Uuid::parse_str(raw).map_err(|e| CodecError::envelope("parent_id", e.to_string()))?,
        ),
        _ => None,
    };

    let priority = JobPriority::from_i16(envelope.priority)
        .ok_or_else(|| CodecError::envelope("priority", "out of range"))?;

    let max_retries = u32::try_from(envelope.max_retries)
        .map_err(|_| CodecError::envelope("max_retries", "negative"))?;

    Ok(JobCore {
        id,
        parent_id,
        url: envelope.url.clone(),
        url_params: envelope.url_params.clone(),
        max_retries,
        priority,
    })
}

fn metadata_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn entry_value(entry: &Entry) -> Result<Value, CodecError> {
    Ok(serde_json::to_value(entry)?)
}

// ============================================================================
// Per-variant codecs
// ============================================================================

pub struct SearchJobCodec;

impl JobCodec for SearchJobCodec {
    fn job_type(&self) -> &'static str {
        SearchJob::JOB_TYPE
    }

    fn encode(&self, job: &CrawlJob) -> Result<JobEnvelope, CodecError> {
        let CrawlJob::Search(j) = job else {
            return Err(CodecError::VariantMismatch {
                expected: self.job_type(),
            });
        };

        let metadata = metadata_map(json!({
            "max_depth": j.max_depth,
            "lang_code": j.lang_code,
            "extract_email": j.extract_email,
            "extract_bodacc": j.extract_bodacc,
            "owner_id": j.owner_id,
            "organization_id": j.organization_id,
        }));

        Ok(envelope_from_core(&j.core, self.job_type(), metadata))
    }

    fn decode(&self, envelope: &JobEnvelope) -> Result<CrawlJob, CodecError> {
        let max_depth = envelope.meta_int("max_depth")?;
        let max_depth = u32::try_from(max_depth)
            .map_err(|_| CodecError::metadata("max_depth", "negative"))?;

        Ok(CrawlJob::Search(SearchJob {
            core: core_from_envelope(envelope)?,
            max_depth,
            lang_code: envelope.meta_str("lang_code")?,
            extract_email: envelope.meta_bool("extract_email")?,
            extract_bodacc: envelope.meta_bool_or_default("extract_bodacc"),
            owner_id: envelope.meta_str("owner_id")?,
            organization_id: envelope.meta_str("organization_id")?,
        }))
    }
}

pub struct PlaceJobCodec;

impl JobCodec for PlaceJobCodec {
    fn job_type(&self) -> &'static str {
        PlaceJob::JOB_TYPE
    }

    fn encode(&self, job: &CrawlJob) -> Result<JobEnvelope, CodecError> {
        let CrawlJob::Place(j) = job else {
            return Err(CodecError::VariantMismatch {
                expected: self.job_type(),
            });
        };

        let metadata = metadata_map(json!({
            "usage_in_results": j.usage_in_results,
            "extract_email": j.extract_email,
            "extract_bodacc": j.extract_bodacc,
            "owner_id": j.owner_id,
            "organization_id": j.organization_id,
        }));

        Ok(envelope_from_core(&j.core, self.job_type(), metadata))
    }

    fn decode(&self, envelope: &JobEnvelope) -> Result<CrawlJob, CodecError> {
        Ok(CrawlJob::Place(PlaceJob {
            core: core_from_envelope(envelope)?,
            usage_in_results: envelope.meta_bool("usage_in_results")?,
            extract_email: envelope.meta_bool("extract_email")?,
            extract_bodacc: envelope.meta_bool_or_default("extract_bodacc"),
            owner_id: envelope.meta_str("owner_id")?,
            organization_id: envelope.meta_str("organization_id")?,
        }))
    }
}

pub struct EmailJobCodec;

impl JobCodec for EmailJobCodec {
    fn job_type(&self) -> &'static str {
        EmailJob::JOB_TYPE
    }

    fn encode(&self, job: &CrawlJob) -> Result<JobEnvelope, CodecError> {
        let CrawlJob::Email(j) = job else {
            return Err(CodecError::VariantMismatch {
                expected: self.job_type(),
            });
        };

        let parent_id = j
            .core
            .parent_id
            .map(|id| id.to_string())
            .unwrap_or_default();

        let metadata = metadata_map(json!({
            "entry": entry_value(&j.entry)?,
            "parent_id": parent_id,
            "extract_bodacc": j.extract_bodacc,
            "owner_id": j.owner_id,
            "organization_id": j.organization_id,
        }));

        Ok(envelope_from_core(&j.core, self.job_type(), metadata))
    }

    fn decode(&self, envelope: &JobEnvelope) -> Result<CrawlJob, CodecError> {
        // The nested entry record must round-trip via re-marshal/unmarshal.
        let entry: Entry = envelope.meta_object("entry")?;
        envelope.meta_str("parent_id")?;

        Ok(CrawlJob::Email(EmailJob {
            core: core_from_envelope(envelope)?,
            entry,
            extract_bodacc: envelope.meta_bool_or_default("extract_bodacc"),
            owner_id: envelope.meta_str("owner_id")?,
            organization_id: envelope.meta_str("organization_id")?,
        }))
    }
}

pub struct BodaccJobCodec;

impl JobCodec for BodaccJobCodec {
    fn job_type(&self) -> &'static str {
        BodaccJob::JOB_TYPE
    }

    fn encode(&self, job: &CrawlJob) -> Result<JobEnvelope, CodecError> {
        let CrawlJob::Bodacc(j) = job else {
            return Err(CodecError::VariantMismatch {
                expected: self.job_type(),
            });
        };

        let metadata = metadata_map(json!({
            "company_name": j.company_name,
            "address": j.address,
            "owner_id": j.owner_id,
            "organization_id": j.organization_id,
            "entry": entry_value(&j.entry)?,
        }));

        Ok(envelope_from_core(&j.core, self.job_type(), metadata))
    }

    fn decode(&self, envelope: &JobEnvelope) -> Result<CrawlJob, CodecError> {
        Ok(CrawlJob::Bodacc(BodaccJob {
            core: core_from_envelope(envelope)?,
            company_name: envelope.meta_str("company_name")?,
            address: envelope.meta_str("address")?,
            owner_id: envelope.meta_str("owner_id")?,
            organization_id: envelope.meta_str("organization_id")?,
            entry: envelope.meta_object_opt("entry")?.unwrap_or_default(),
        }))
    }
}

pub struct PappersJobCodec;

impl JobCodec for PappersJobCodec {
    fn job_type(&self) -> &'static str {
        PappersJob::JOB_TYPE
    }

    fn encode(&self, job: &CrawlJob) -> Result<JobEnvelope, CodecError> {
        let CrawlJob::Pappers(j) = job else {
            return Err(CodecError::VariantMismatch {
                expected: self.job_type(),
            });
        };

        let metadata = metadata_map(json!({
            "owner_id": j.owner_id,
            "organization_id": j.organization_id,
            "entry": entry_value(&j.entry)?,
        }));

        Ok(envelope_from_core(&j.core, self.job_type(), metadata))
    }

    fn decode(&self, envelope: &JobEnvelope) -> Result<CrawlJob, CodecError> {
        Ok(CrawlJob::Pappers(PappersJob {
            core: core_from_envelope(envelope)?,
            owner_id: envelope.meta_str("owner_id")?,
            organization_id: envelope.meta_str("organization_id")?,
            entry: envelope.meta_object_opt("entry")?.unwrap_or_default(),
        }))
    }
}
