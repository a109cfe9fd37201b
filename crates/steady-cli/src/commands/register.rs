use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use ndarray::Array2;
use steady_core::io::image_io::{load_image, save_image};
use steady_core::io::record::{load_record, save_record};
use steady_core::pipeline::{register_session, RegisterOptions, RegistrationConfig, SessionRecord};
use tracing::{info, warn};

use crate::progress::BarReporter;
use crate::summary::{print_config_summary, print_record_summary};

/// File name of the session record inside `save_path`.
pub const RECORD_FILE: &str = "registration.json";

#[derive(Args)]
pub struct RegisterArgs {
    /// Session config files (TOML); sessions run one after another
    #[arg(required = true)]
    pub configs: Vec<PathBuf>,

    /// Ignore any existing session record and start a new history
    #[arg(long)]
    pub fresh: bool,

    /// Read the registered stream even when a raw stream is kept
    #[arg(long)]
    pub no_raw: bool,

    /// Reference image (TIFF/PNG) to align to instead of building one
    #[arg(long)]
    pub reference: Option<PathBuf>,

    /// Also write the reference and mean images next to the record
    #[arg(long, value_enum)]
    pub save_images: Option<ImageFormatArg>,
}

#[derive(Clone, Copy, clap::ValueEnum)]
pub enum ImageFormatArg {
    Tiff,
    Png,
}

impl ImageFormatArg {
    fn extension(self) -> &'static str {
        match self {
            Self::Tiff => "tif",
            Self::Png => "png",
        }
    }
}

pub fn run(args: &RegisterArgs) -> Result<()> {
    let reference = args
        .reference
        .as_deref()
        .map(|path| {
            load_image(path).with_context(|| format!("Failed to read reference {}", path.display()))
        })
        .transpose()?;

    let mut failed = Vec::new();
    for (i, path) in args.configs.iter().enumerate() {
        if args.configs.len() > 1 {
            println!("Session {}/{}: {}", i + 1, args.configs.len(), path.display());
        }
        if let Err(e) = run_one(path, args, reference.clone()) {
            eprintln!("Session {} failed: {:#}", path.display(), e);
            failed.push(path.clone());
        }
    }

    if !failed.is_empty() {
        bail!("{} of {} sessions failed", failed.len(), args.configs.len());
    }
    Ok(())
}

fn run_one(config_path: &Path, args: &RegisterArgs, reference: Option<Array2<f32>>) -> Result<()> {
    let config = super::load_config(config_path)?;
    print_config_summary(&config);

    let record_path = config.save_path.join(RECORD_FILE);
    let prior = if args.fresh {
        None
    } else {
        load_prior(&record_path)
    };

    let options = RegisterOptions {
        reference,
        prefer_raw: !args.no_raw,
    };
    let reporter = Arc::new(BarReporter::new()?);
    let record = match register_session(&config, prior.as_ref(), options, reporter.clone()) {
        Ok(record) => {
            reporter.finish();
            record
        }
        Err(e) => {
            reporter.abandon();
            return Err(e).with_context(|| format!("Registration of {} failed", config.save_path.display()));
        }
    };

    save_record(&record, &record_path)
        .with_context(|| format!("Failed to save record {}", record_path.display()))?;
    if let Some(format) = args.save_images {
        save_images(&config, &record, format)?;
    }

    print_record_summary(&record);
    println!("Record saved to {}", record_path.display());
    Ok(())
}

fn load_prior(path: &Path) -> Option<SessionRecord> {
    if !path.exists() {
        return None;
    }
    match load_record(path) {
        Ok(record) => {
            info!("Continuing session from {}", path.display());
            Some(record)
        }
        Err(e) => {
            warn!("Ignoring unreadable record {}: {}", path.display(), e);
            None
        }
    }
}

fn save_images(config: &RegistrationConfig, record: &SessionRecord, format: ImageFormatArg) -> Result<()> {
    let ext = format.extension();
    let mut images = vec![("ref_img", &record.ref_img), ("mean_img", &record.mean_img)];
    if let Some(chan2) = &record.mean_img_chan2 {
        images.push(("mean_img_chan2", chan2));
    }
    for (name, image) in images {
        let path = config.save_path.join(format!("{name}.{ext}"));
        save_image(image, &path).with_context(|| format!("Failed to write {}", path.display()))?;
    }
    Ok(())
}
