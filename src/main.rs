mod cli;
mod progress;
mod reporting;

use clap::Parser;
use cli::{Cli, ClassifyArgs, Command};
use miette::{miette, IntoDiagnostic, Result};
use std::path::Path;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use trafficmode_core::{
    write_report, AssetStore, BundleDir, ClassificationRecord, ClassificationReport,
    ClassifierConfig, EngineLoader, FileResolver, ImageClassifier, ImageImporter,
    ResourceHandle, Session,
};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Classify(args) => classify_command(&config, &args),
        Command::Materialize => run_materialize(&config),
        Command::Prune => run_prune(&config),
        Command::Config => {
            print!("{}", config.to_toml().into_diagnostic()?);
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<ClassifierConfig> {
    let config = match path {
        Some(path) => ClassifierConfig::load(path).into_diagnostic()?,
        None => ClassifierConfig::load_or_default().into_diagnostic()?,
    };
    config.validate().into_diagnostic()?;
    Ok(config)
}

#[cfg(feature = "onnx")]
fn classify_command(config: &ClassifierConfig, args: &ClassifyArgs) -> Result<()> {
    run_classify(config, args, trafficmode_core::OnnxLoader::default())
}

#[cfg(not(feature = "onnx"))]
fn classify_command(_config: &ClassifierConfig, _args: &ClassifyArgs) -> Result<()> {
    Err(miette!(
        "trafficmode was built without an inference backend; rebuild with `--features onnx`"
    ))
}

#[cfg_attr(not(feature = "onnx"), allow(dead_code))]
fn run_classify<L: EngineLoader>(
    config: &ClassifierConfig,
    args: &ClassifyArgs,
    loader: L,
) -> Result<()> {
    let classifier = ImageClassifier::from_config(config, loader).into_diagnostic()?;
    let importer =
        ImageImporter::new(FileResolver, config.imports_dir()).with_retention(config.retention);
    let mut session = Session::new(importer, classifier);

    let progress_bar = progress::batch_bar(args.images.len());
    let mut records = Vec::with_capacity(args.images.len());
    for image in &args.images {
        progress_bar.set_message(image.clone());
        records.push(classify_one(&mut session, image, usize::from(args.top)));
        progress_bar.inc(1);
    }
    progress_bar.finish_and_clear();

    if let Err(error) = session.reset() {
        warn!(%error, "failed to release imported image");
    }

    reporting::print_records(&records);

    let failed = records.iter().filter(|record| record.error.is_some()).count();
    if let Some(path) = &args.json {
        let report = ClassificationReport::new(config.model.asset.clone(), records);
        write_report(&report, path).into_diagnostic()?;
        info!(path = %path.display(), "report written");
    }

    if failed > 0 {
        return Err(miette!("{} of {} images failed", failed, args.images.len()));
    }
    Ok(())
}

#[cfg_attr(not(feature = "onnx"), allow(dead_code))]
fn classify_one<L: EngineLoader>(
    session: &mut Session<L>,
    image: &str,
    top: usize,
) -> ClassificationRecord {
    let handle = ResourceHandle::new(image);
    if let Err(error) = session.select_image(&handle) {
        return ClassificationRecord::failure(image, error);
    }
    if let Err(error) = session.classify() {
        return ClassificationRecord::failure(image, error);
    }
    match session.ranked(top) {
        Ok(predictions) => ClassificationRecord::success(image, predictions),
        Err(error) => ClassificationRecord::failure(image, error),
    }
}

fn run_materialize(config: &ClassifierConfig) -> Result<()> {
    let store = AssetStore::new(BundleDir::new(&config.bundle_dir), config.files_dir());
    let path = store.ensure_local(&config.model.asset).into_diagnostic()?;
    println!("{}", path.display());
    Ok(())
}

fn run_prune(config: &ClassifierConfig) -> Result<()> {
    let importer = ImageImporter::new(FileResolver, config.imports_dir());
    let removed = importer.prune().into_diagnostic()?;
    println!("Removed {} imported image(s) from {}", removed, importer.root().display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;
    use trafficmode_core::{FixedScoresEngine, FixedScoresLoader};

    fn config_in(root: &Path) -> ClassifierConfig {
        let bundle = root.join("bundle");
        fs::create_dir_all(&bundle).unwrap();
        fs::write(bundle.join("model.onnx"), b"weights").unwrap();
        let mut config = ClassifierConfig::default();
        config.bundle_dir = bundle;
        config.data_dir = root.join("data");
        config.model.labels = vec!["walk".into(), "bike".into(), "car".into()];
        config
    }

    #[test]
    fn classify_writes_report_and_releases_imports() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());
        let photo = dir.path().join("street.png");
        image::RgbImage::from_pixel(8, 8, image::Rgb([200, 10, 10]))
            .save(&photo)
            .unwrap();
        let report_path = dir.path().join("report.json");
        let args = ClassifyArgs {
            images: vec![photo.display().to_string()],
            top: 2,
            json: Some(report_path.clone()),
        };

        run_classify(
            &config,
            &args,
            FixedScoresLoader::new(FixedScoresEngine::new(vec![0.0, 0.0, 1.0])),
        )
        .unwrap();

        let report = trafficmode_core::read_report(&report_path).unwrap();
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].predictions[0].label, "car");
        assert_eq!(report.records[0].predictions.len(), 2);
        assert_eq!(fs::read_dir(config.imports_dir()).unwrap().count(), 0);
    }

    #[test]
    fn classify_reports_failed_images() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());
        let args = ClassifyArgs {
            images: vec![dir.path().join("missing.jpg").display().to_string()],
            top: 1,
            json: None,
        };

        let result = run_classify(
            &config,
            &args,
            FixedScoresLoader::new(FixedScoresEngine::new(vec![0.0, 0.0, 1.0])),
        );
        assert!(result.is_err());
    }

    #[test]
    fn materialize_copies_model_into_files_dir() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());
        run_materialize(&config).unwrap();
        assert_eq!(
            fs::read(config.files_dir().join("model.onnx")).unwrap(),
            b"weights"
        );
    }
}
