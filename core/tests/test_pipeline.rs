// * ✅ end-to-end stream → bytes → assemble correctness (sync and async)
// * ✅ reader thread + bounded channel assembly
// * ✅ public API over memory and file sinks
// * ✅ error propagation (aborted stream, truncated source)

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use serde_json::{json, Value};

    use progressive_core::prelude::*;
    use progressive_core::progressive::{
        run_assemble_pipeline, run_assemble_pipeline_async, run_stream_pipeline,
        run_stream_pipeline_async,
    };
    use progressive_core::telemetry::Stage;

    // ------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------
    fn order() -> RecordNode {
        RecordNode::new()
            .field("order_id", 42)
            .field("customer", RecordNode::new().field("name", "Ada").field("tier", "gold"))
            .field(
                "lines",
                vec![
                    RecordNode::new().field("sku", "A-1").field("qty", 2),
                    RecordNode::new().field("sku", "B-7").field("qty", 1),
                ],
            )
            .field("total", Deferred::from_fn(|| 99.5))
            .field("notes", ())
    }

    fn expected() -> Value {
        dump(order()).unwrap()
    }

    fn stream_bytes() -> Vec<u8> {
        let mut out = Vec::new();
        run_stream_pipeline(ProgressiveStreamer::new(order()), &mut out).unwrap();
        out
    }

    fn with_garbage_line(bytes: Vec<u8>) -> Vec<u8> {
        let mut out = b"\xff\xfe garbage\r\n".to_vec();
        out.extend(bytes);
        out
    }

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("progressive-core-{}-{name}", std::process::id()))
    }

    // ------------------------------------------------------------
    // Sync pipelines
    // ------------------------------------------------------------
    #[test]
    fn stream_pipeline_writes_one_line_per_frame() {
        let mut out = Vec::new();
        let outcome = run_stream_pipeline(ProgressiveStreamer::new(order()), &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len() as u64, outcome.frames_written);
        assert_eq!(lines.len(), 6);
        assert_eq!(lines.last(), Some(&r#"{"completed_stream":true}"#));
        assert!(outcome.report.is_clean());
        assert_eq!(outcome.telemetry.counters.bytes_out, text.len() as u64);
        assert!(outcome.telemetry.has_all_stages(&[Stage::Encode, Stage::Compute, Stage::Write]));
    }

    #[test]
    fn assemble_pipeline_round_trip() {
        let outcome = run_assemble_pipeline(Cursor::new(stream_bytes()), AssembleConfig::default()).unwrap();
        assert_eq!(outcome.document, expected());
        assert!(outcome.issues.is_empty());
        assert!(outcome.unresolved.is_empty());
        assert!(outcome.telemetry.sanity_check());
    }

    #[test]
    fn assemble_pipeline_reports_truncated_source() {
        let bytes = stream_bytes();
        let text = String::from_utf8(bytes).unwrap();
        let truncated: String = text.lines().take(3).map(|l| format!("{l}\n")).collect();
        let err = run_assemble_pipeline(Cursor::new(truncated.into_bytes()), AssembleConfig::default()).unwrap_err();
        assert!(matches!(err, StreamError::Incomplete));
    }

    #[test]
    fn assemble_pipeline_skips_oversized_lines() {
        let mut bytes = stream_bytes();
        let padding = format!("\"{}\"\n", "x".repeat(256));
        bytes.splice(0..0, padding.into_bytes());
        let config = AssembleConfig::default().with_max_frame_len(200);
        let outcome = run_assemble_pipeline(Cursor::new(bytes), config).unwrap();
        assert_eq!(outcome.document, expected());
        assert_eq!(outcome.telemetry.counters.decode_failures, 1);
    }

    #[test]
    fn assemble_pipeline_skips_non_utf8_lines() {
        let bytes = with_garbage_line(stream_bytes());
        let outcome = run_assemble_pipeline(Cursor::new(bytes), AssembleConfig::default()).unwrap();
        assert_eq!(outcome.document, expected());
        assert_eq!(outcome.telemetry.counters.decode_failures, 1);
    }

    #[test]
    fn error_shaped_root_field_survives_the_wire() {
        let root = || RecordNode::new().field("stream_error", json!({"token": "x"}));
        let mut out = Vec::new();
        run_stream_pipeline(ProgressiveStreamer::new(root()), &mut out).unwrap();

        let outcome = run_assemble_pipeline(Cursor::new(out), AssembleConfig::default()).unwrap();
        assert_eq!(outcome.document, dump(root()).unwrap());
        assert_eq!(outcome.telemetry.counters.decode_failures, 0);
    }

    #[test]
    fn aborted_stream_fails_the_pipeline() {
        let root = order().field("bad", Deferred::sync(|| Err::<i32, _>(ComputeError::msg("nope"))));
        let streamer = ProgressiveStreamer::new(root).with_config(StreamConfig::new(FailureMode::Abort));
        let mut out = Vec::new();
        let err = run_stream_pipeline(streamer, &mut out).unwrap_err();
        assert!(matches!(err, StreamError::Compute(_)));
        assert!(!String::from_utf8(out).unwrap().contains("\"completed_stream\":true"));
    }

    // ------------------------------------------------------------
    // Public API
    // ------------------------------------------------------------
    #[test]
    fn api_memory_round_trip() {
        let config = ApiConfig::with_buf_enabled();
        let streamed = stream_to_sink(order(), OutputSink::Memory, &config).unwrap();
        let bytes = streamed.output.expect("buffer captured");

        let assembled = assemble_from_source(InputSource::Memory(bytes), &config).unwrap();
        assert_eq!(assembled.document, expected());
    }

    #[test]
    fn api_file_round_trip() {
        let path = temp_path("frames.ndjson");
        let config = ApiConfig::default();
        let streamed = stream_to_sink(order(), OutputSink::File(path.clone()), &config).unwrap();
        assert!(streamed.output.is_none());

        let assembled = assemble_from_source(InputSource::File(path.clone()), &config).unwrap();
        assert_eq!(assembled.document, expected());
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn api_rejects_invalid_config() {
        let config = ApiConfig::default()
            .with_assemble(AssembleConfig::default().with_policy(DecodePolicy::new(0)));
        let err = assemble_from_source(InputSource::Memory(Vec::new()), &config).unwrap_err();
        assert!(matches!(err, StreamError::Validation(_)));
    }

    // ------------------------------------------------------------
    // Async pipelines
    // ------------------------------------------------------------
    #[tokio::test]
    async fn async_pipelines_round_trip() {
        let mut out: Vec<u8> = Vec::new();
        let streamed = run_stream_pipeline_async(ProgressiveStreamer::new(order()), &mut out)
            .await
            .unwrap();
        assert_eq!(streamed.frames_written, 6);
        assert_eq!(out, stream_bytes());

        let assembled = run_assemble_pipeline_async(out.as_slice(), AssembleConfig::default())
            .await
            .unwrap();
        assert_eq!(assembled.document, expected());
        assert_eq!(assembled.document["total"], json!(99.5));
    }

    #[tokio::test]
    async fn async_pipeline_skips_undecodable_lines() {
        let mut bytes = with_garbage_line(stream_bytes());
        let padding = format!("{}\n", "x".repeat(256));
        bytes.splice(0..0, padding.into_bytes());

        let config = AssembleConfig::default().with_max_frame_len(200);
        let outcome = run_assemble_pipeline_async(bytes.as_slice(), config).await.unwrap();
        assert_eq!(outcome.document, expected());
        assert_eq!(outcome.telemetry.counters.decode_failures, 2);
        assert!(outcome.issues.is_empty());
    }

    #[tokio::test]
    async fn async_pipeline_over_duplex_pipe() {
        let (client, server) = tokio::io::duplex(64);
        let producer = tokio::spawn(async move {
            run_stream_pipeline_async(ProgressiveStreamer::new(order()), client).await
        });
        let assembled = run_assemble_pipeline_async(server, AssembleConfig::default())
            .await
            .unwrap();
        producer.await.unwrap().unwrap();
        assert_eq!(assembled.document, expected());
    }
}
