use std::path::Path;

use courtside_media::{check_ffmpeg, check_ffprobe};
use courtside_worker::{ModelPaths, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env();

    println!(
        "courtside-selfcheck: starting with work_dir={}",
        config.work_dir.display()
    );
    ensure_workdir(&config.work_dir).await?;
    check_ffmpeg().map_err(|e| anyhow::anyhow!("ffmpeg not available: {}", e))?;
    check_ffprobe().map_err(|e| anyhow::anyhow!("ffprobe not available: {}", e))?;
    ensure_models(&config.models)?;

    println!("courtside-selfcheck: ok");
    Ok(())
}

async fn ensure_workdir<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    let path = path.as_ref();
    tokio::fs::create_dir_all(path).await?;
    Ok(())
}

/// Configured model paths must exist; unset ones are reported and skipped.
fn ensure_models(models: &ModelPaths) -> anyhow::Result<()> {
    let entries = [
        ("PERSON_MODEL_PATH", &models.person),
        ("BALL_MODEL_PATH", &models.ball),
        ("STROKE_MODEL_PATH", &models.stroke),
        ("POSE_MODEL_PATH", &models.pose),
    ];
    for (var, path) in entries {
        match path {
            Some(path) if path.is_file() => {
                println!("courtside-selfcheck: {} = {}", var, path.display());
            }
            Some(path) => {
                return Err(anyhow::anyhow!(
                    "{} points to a missing file: {}",
                    var,
                    path.display()
                ));
            }
            None => println!("courtside-selfcheck: {} not set, capability disabled", var),
        }
    }
    Ok(())
}
