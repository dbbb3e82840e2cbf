//! # Feeder Monitor
//!
//! Observador em terminal da telemetria ao vivo do alimentador.
//!
//! Sobe um [`SyncClient`] com a configuração do `config.toml` (e das
//! variáveis `FEEDER_*`), imprime uma linha a cada mudança de estado e
//! avisa quando o nível do tanque cruza um threshold.
//!
//! ## Comandos (stdin)
//! - `r`: Atualizar agora
//! - `q` / Ctrl+C: Sair (salva o snapshot)

mod report;

use crossbeam_channel::{Receiver, Sender, unbounded};
use feeder_core::alerts::evaluate_alerts;
use feeder_core::config::{AlertThresholds, AppConfig};
use feeder_core::types::SyncState;
use feeder_sync::SyncClient;
use feeder_sync::http::HttpPull;
use report::AlertWatch;
use std::io::BufRead;
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};

/// Intervalo máximo entre verificações de comandos.
const LOOP_TICK: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy)]
enum Command {
    Refresh,
    Quit,
}

fn main() -> ExitCode {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── Config ──
    let config_path = AppConfig::default_path();
    let mut config = AppConfig::load(&config_path);

    if !config_path.exists() {
        save_default_config(&config, &config_path);
    }
    config.apply_env();

    let errors = config.validate();
    for e in &errors {
        error!("Config: {e}");
    }
    if !errors.is_empty() {
        return ExitCode::FAILURE;
    }

    // ── Health check ──
    match HttpPull::new(&config.client) {
        Ok(probe) if probe.check_health() => info!("Backend acessível em {}", config.client.api_base_url),
        Ok(_) => warn!("Backend não respondeu ao /health, seguindo mesmo assim"),
        Err(e) => warn!("Health check indisponível: {e}"),
    }

    // ── Cliente ──
    let mut client = match SyncClient::connect(&config) {
        Ok(client) => client,
        Err(e) => {
            error!("Falha ao iniciar o cliente: {e}");
            return ExitCode::FAILURE;
        }
    };
    let states = client.subscribe();
    let (command_tx, commands) = unbounded();
    install_ctrlc(command_tx.clone());
    spawn_stdin_thread(command_tx);

    println!("{}", report::summary(&client.state()));
    run(&mut client, &states, &commands, &config.alerts);
    ExitCode::SUCCESS
}

/// Grava o `config.toml` padrão; falha só é registrada.
fn save_default_config(config: &AppConfig, path: &Path) -> bool {
    match config.save(path) {
        Ok(()) => true,
        Err(e) => {
            warn!("Não foi possível gravar {}: {e}", path.display());
            false
        }
    }
}

/// Loop principal até `Quit`; sai sempre pelo `close()`.
fn run(
    client: &mut SyncClient,
    states: &Receiver<SyncState>,
    commands: &Receiver<Command>,
    thresholds: &AlertThresholds,
) {
    let mut alerts = AlertWatch::default();

    loop {
        client.wait(LOOP_TICK);

        for state in states.try_iter() {
            println!("{}", report::summary(&state));

            if let Some(sample) = &state.current {
                let active = evaluate_alerts(sample, thresholds);
                if let Some(level) = alerts.update(&active) {
                    info!("Nível de alerta: {level:?}");
                    for alert in &active {
                        warn!("{}", report::alert_line(alert));
                    }
                }
            }
        }

        match commands.try_recv() {
            Ok(Command::Refresh) => client.refresh(),
            Ok(Command::Quit) => break,
            // Vazio; Ctrl+C mantém um sender vivo
            Err(_) => {}
        }
    }

    client.close();
}

/// Ctrl+C vira `Quit`, então o loop sai pelo `close()` normal.
fn install_ctrlc(tx: Sender<Command>) {
    let installed = ctrlc::set_handler(move || {
        let _ = tx.send(Command::Quit);
    });
    if let Err(e) = installed {
        warn!("Sem tratamento de Ctrl+C, snapshot só é salvo com `q`: {e}");
    }
}

/// Lê comandos do stdin numa thread própria.
fn spawn_stdin_thread(tx: Sender<Command>) {
    let spawned = std::thread::Builder::new()
        .name("stdin".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                let command = match line.trim() {
                    "r" => Command::Refresh,
                    "q" => Command::Quit,
                    "" => continue,
                    other => {
                        warn!("Comando desconhecido: {other} (r = atualizar, q = sair)");
                        continue;
                    }
                };
                if tx.send(command).is_err() {
                    break;
                }
            }
        });

    if let Err(e) = spawned {
        warn!("Sem leitura de comandos: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use feeder_core::snapshot;
    use feeder_core::types::{MotorState, TelemetrySample};

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("feeder_monitor_{}_{name}", std::process::id()))
    }

    #[test]
    fn config_save_failure_is_reported() {
        let config = AppConfig::default();
        let missing_dir = temp_path("nao_existe").join("config.toml");
        assert!(!save_default_config(&config, &missing_dir));

        let path = temp_path("config.toml");
        assert!(save_default_config(&config, &path));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn quit_command_closes_and_saves_snapshot() {
        let path = temp_path("snapshot.bin");
        let seeded = TelemetrySample::new(Some(77.0), Some(40.0), MotorState::Idle, 5.0, Utc::now());
        snapshot::save_snapshot(&path, &seeded).unwrap();

        let mut config = AppConfig::default();
        // Porta sem servidor: os pulls só falham
        config.client.api_base_url = "http://127.0.0.1:9".into();
        config.client.snapshot_path = path.to_string_lossy().into_owned();

        let mut client = SyncClient::connect(&config).unwrap();
        let states = client.subscribe();
        std::fs::remove_file(&path).unwrap();

        let (tx, commands) = unbounded();
        tx.send(Command::Quit).unwrap();
        run(&mut client, &states, &commands, &config.alerts);

        assert!(client.is_closed());
        let saved = snapshot::load_snapshot(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(saved.and_then(|s| s.weight), Some(77.0));
    }
}
