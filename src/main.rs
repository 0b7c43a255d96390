use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use media_gallery::client::{self, DEFAULT_SERVER};
use media_gallery::gallery;
use media_gallery::serve::{self, DEFAULT_PORT, PUBLIC_DIR, ServeConfig, UPLOAD_DIR};
use media_gallery::upload::UploadLimits;

#[derive(Parser)]
#[command(
    name = "media-gallery",
    about = "Galerie personnelle d'images et de vidéos, avec envoi de fichiers"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lancer le serveur : galerie statique et point d'envoi /upload
    Serve {
        /// Port du serveur (par défaut : 3000)
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,
        /// Dossier des fichiers statiques de la galerie
        #[arg(long, default_value = PUBLIC_DIR)]
        public: PathBuf,
        /// Dossier de réception des fichiers envoyés
        #[arg(long, default_value = UPLOAD_DIR)]
        uploads: PathBuf,
    },
    /// Envoyer des images ou vidéos au serveur
    Upload {
        /// Fichiers à envoyer (10 au maximum)
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Adresse du serveur
        #[arg(short, long, default_value = DEFAULT_SERVER)]
        server: String,
    },
    /// Générer la page index.html de la galerie
    Gallery {
        /// Dossier contenant les médias
        #[arg(long, default_value = PUBLIC_DIR)]
        public: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            public,
            uploads,
        } => serve::run_serve(&ServeConfig {
            port,
            public_dir: public,
            upload_dir: uploads,
            limits: UploadLimits::default(),
        }),
        Commands::Upload { files, server } => client::run_upload(&server, &files),
        Commands::Gallery { public } => gallery::run_gallery(&public),
    }
}
