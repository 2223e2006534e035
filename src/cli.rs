//! Interface de linha de comando do job manager baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (serve, validate)
//! e a flag global `--verbose`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Job manager: rastreia jobs de implantação e os entrega aos orquestradores.
#[derive(Debug, Parser)]
#[command(name = "jobmanager", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Habilita saída detalhada (nível debug).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Inicia o servidor HTTP.
    Serve {
        /// Caminho do arquivo de configuração TOML.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Endereço de escuta (sobrescreve o arquivo e o ambiente).
        #[arg(long)]
        listen: Option<String>,
    },

    /// Valida um descritor de aplicação sem contatar nenhum serviço.
    Validate {
        /// Arquivo YAML do descritor.
        file: PathBuf,
    },
}
