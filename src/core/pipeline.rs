//! Per-recording orchestration.
//!
//! Every sensor stream (and every prediction stream) is processed on its own
//! scoped worker. Workers share nothing but the stats counters; results come
//! back over a channel tagged with the stream index and are put back in
//! input order before the recording is assembled.

use crate::config::PipelineConfig;
use crate::core::annotate::TriggerAnnotator;
use crate::core::duplicates::resolve_duplicates;
use crate::core::options::{RecordingCollectionSensorOptions, SensorOptionsTable};
use crate::core::trigger::FilterDetails;
use crate::core::windowing::WindowAssembler;
use crate::error::Result;
use crate::recording::{
    AnnotatedRecordingCollection, AnnotationGroup, AnnotationGroupMetadata, AnnotationSequence,
    Datapoint, PredictionStream, RawRecording, RawSensorStream, RecordingCollection, Sequence,
    SequenceMetadata,
};
use crate::stats::{Counter, SharedStats};
use crossbeam_channel::unbounded;

/// Name of the annotation group holding filter output.
pub const MODEL_TRIGGERS_GROUP: &str = "model_triggers";

/// A finished sequence plus the datapoints of a trailing partial window.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledSequence {
    pub sequence: Sequence,
    pub pending: Vec<Datapoint>,
}

/// Resolve duplicates and window one raw sensor stream.
pub fn assemble_sequence(
    stream: RawSensorStream,
    options: &RecordingCollectionSensorOptions,
    config: &PipelineConfig,
    stats: SharedStats,
) -> Result<AssembledSequence> {
    let strategy = options.duplicate_strategy(config.default_duplicate_strategy);
    let resolution = resolve_duplicates(stream.samples, strategy)?;
    if resolution.duplicates_dropped > 0 {
        tracing::debug!(
            sensor = %stream.sensor_type,
            subtype = %stream.subtype,
            dropped = resolution.duplicates_dropped,
            "Dropped duplicate timestamps"
        );
        stats.record_many(
            Counter::DuplicatesDropped,
            resolution.duplicates_dropped as u64,
        );
    }

    let mut assembler = WindowAssembler::new(options, config, stats);
    for sample in resolution.items {
        assembler.push(sample)?;
    }
    let assembled = assembler.finish()?;

    let sequence = Sequence {
        metadata: SequenceMetadata {
            sensor_type: stream.sensor_type,
            subtype: stream.subtype,
            dimensionality: options.required_dims,
            windowed: options.is_windowed(),
            window_size: options.window_dims,
            sampling_rate_hz: stream.sampling_rate_hz,
        },
        data: assembled.data,
    };
    sequence.validate()?;

    tracing::info!(
        sensor = %sequence.metadata.sensor_type,
        subtype = %sequence.metadata.subtype,
        datapoints = sequence.datapoint_count(),
        pending = assembled.pending.len(),
        "Sensor stream assembled"
    );
    Ok(AssembledSequence {
        sequence,
        pending: assembled.pending,
    })
}

/// Turn a raw recording into a validated `RecordingCollection`.
///
/// Options are looked up for every stream before any worker starts. The
/// first failing stream (by input order) fails the whole recording.
pub fn process_recording(
    raw: RawRecording,
    table: &SensorOptionsTable,
    config: &PipelineConfig,
    stats: SharedStats,
) -> Result<RecordingCollection> {
    table.validate()?;
    let jobs = raw
        .streams
        .into_iter()
        .map(|stream| {
            let options = table.lookup(&stream.sensor_type, &stream.subtype)?;
            Ok((stream, options))
        })
        .collect::<Result<Vec<_>>>()?;

    let results = run_workers(jobs, |(stream, options)| {
        assemble_sequence(stream, options, config, stats.clone())
    });

    let sequences = results
        .into_iter()
        .map(|result| result.map(|assembled| assembled.sequence))
        .collect::<Result<Vec<_>>>()?;

    let collection = RecordingCollection {
        metadata: raw.metadata,
        sequences,
    };
    collection.validate()?;
    Ok(collection)
}

/// Run one trigger filter per prediction stream and attach the results.
pub fn annotate_recording(
    recording: RecordingCollection,
    prediction_streams: Vec<PredictionStream>,
    details: &FilterDetails,
    config: &PipelineConfig,
    stats: SharedStats,
) -> Result<AnnotatedRecordingCollection> {
    details.validate()?;
    let annotator = TriggerAnnotator::new();
    let policy = config.strictness.malformed_prediction;

    let results = run_workers(prediction_streams, |stream| {
        annotator.annotate_stream(stream, details, policy, stats.clone())
    });
    let sequences = results.into_iter().collect::<Result<Vec<AnnotationSequence>>>()?;

    Ok(AnnotatedRecordingCollection {
        recording,
        groups: vec![AnnotationGroup {
            metadata: AnnotationGroupMetadata {
                name: MODEL_TRIGGERS_GROUP.to_string(),
                description: format!("Triggers from annotator {}", annotator.instance_id()),
            },
            sequences,
        }],
    })
}

/// Run `work` on every job in its own scoped thread, returning results in
/// job order.
fn run_workers<J, T, F>(jobs: Vec<J>, work: F) -> Vec<Result<T>>
where
    J: Send,
    T: Send,
    F: Fn(J) -> Result<T> + Sync,
{
    let count = jobs.len();
    let (tx, rx) = unbounded();

    std::thread::scope(|scope| {
        for (index, job) in jobs.into_iter().enumerate() {
            let tx = tx.clone();
            let work = &work;
            scope.spawn(move || {
                tx.send((index, work(job))).ok();
            });
        }
    });
    drop(tx);

    let mut results: Vec<(usize, Result<T>)> = rx.iter().collect();
    debug_assert_eq!(results.len(), count);
    results.sort_by_key(|(index, _)| *index);
    results.into_iter().map(|(_, result)| result).collect()
}
