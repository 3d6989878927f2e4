use anyhow::{Context, Result};
use serde::Serialize;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pose_kinematics::config::Config;
use pose_kinematics::pose::{JsonPoseSource, PerspectiveLifter, PoseSource};
use pose_kinematics::{Analysis, Pipeline, ResultSink};

const CONFIG_PATH: &str = "config.toml";

/// 同じディレクトリの一時ファイルに書いてから置き換える。
/// 途中で失敗しても既存の出力は壊れない
fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        serde_json::to_writer(&mut writer, value)?;
        writer.flush()?;
    }
    tmp.persist(path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

/// 解析結果を JSON で書き出す
struct JsonWriter {
    path: PathBuf,
}

impl ResultSink for JsonWriter {
    fn write(&mut self, analysis: &Analysis) -> Result<()> {
        write_json_atomic(&self.path, analysis)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| CONFIG_PATH.to_string());
    let config = Config::load_or_default(&config_path)?;
    info!(version = env!("GIT_VERSION"), config = %config_path, "pose-kinematics");

    let source = JsonPoseSource::from_path(&config.input)?;
    info!(
        input = %config.input,
        frames = source.remaining(),
        fps = source.fps(),
        "loaded detections"
    );
    let lifter = PerspectiveLifter::from_config(&config.lifter);
    let sink = JsonWriter {
        path: PathBuf::from(&config.output),
    };

    let pipeline = Pipeline::new(config);
    let analysis = pipeline
        .run(source, lifter, sink)
        .with_context(|| format!("Analysis of {} failed", pipeline.config().input))?;

    info!(
        frames = analysis.keypoints_3d.len(),
        dropped = analysis.dropped_frames,
        filter = analysis.filter,
        output = %pipeline.config().output,
        "analysis written"
    );
    Ok(())
}
