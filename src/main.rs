use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use suma_volume::{RepositoryStore, StoreConfig, VolumeLoader};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "suma-volume", version, about = "Multi-echo MRI volume tools")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Assemble a volume from a DICOM directory and print its layout
    Load { dir: PathBuf },
    /// List stored patients and treatments
    Patients {
        /// Store root, defaults to SUMA_DATA_ROOT or ./Patient_data
        #[arg(long)]
        root: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Command::Load { dir } => match VolumeLoader::load(&dir) {
            Ok(volume) => {
                let (rows, columns, slices, echoes) = volume.dim();
                println!("dimensions:      {rows} x {columns} x {slices} x {echoes}");
                println!("echo times (ms): {:?}", volume.echo_times());
                println!("slice locations: {:?}", volume.slice_locations());
                println!("pixel spacing:   {:?} mm", volume.pixel_spacing());
                println!("slice thickness: {} mm", volume.slice_thickness());
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{}: {e}", dir.display());
                ExitCode::FAILURE
            }
        },
        Command::Patients { root } => {
            let mut config = StoreConfig::from_env();
            if let Some(root) = root {
                config.data_root = root;
            }
            let store = RepositoryStore::new(config);
            for treatment in store.get_all_treatments() {
                let analysed =
                    store.has_analysis_result(&treatment.patient_id, &treatment.treatment_id);
                println!(
                    "{}\t{}",
                    treatment.display_name(),
                    if analysed { "analysed" } else { "pending" }
                );
            }
            ExitCode::SUCCESS
        }
    }
}
