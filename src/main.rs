use manyhands::{
    ActorPool, Config, EngineCommand, EngineUpdate, MidiSource, NoteEvent, SmfPlayer,
    spawn_engine, spawn_logging_performer,
};
use std::io::BufRead;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const HELP: &str = "commands: load <file> | play | pause | stop | note <pitch> | deblack | sustain | status | quit";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.ron"));
    let config = if config_path.exists() {
        Config::load(&config_path)?
    } else {
        tracing::warn!(path = %config_path.display(), "no config found, writing defaults");
        let config = Config::default();
        config.save(&config_path)?;
        config
    };

    let actors = config
        .actors
        .iter()
        .enumerate()
        .map(|(index, actor)| spawn_logging_performer(index, actor.color, actor.mode))
        .collect::<Result<Vec<_>, _>>()?;
    let pool = ActorPool::new(actors);

    let engine = spawn_engine(
        config.clone(),
        pool,
        Box::new(|| Box::new(SmfPlayer::new()) as Box<dyn MidiSource>),
    )?;

    let updates = engine.update_rx.clone();
    std::thread::Builder::new()
        .name("updates".into())
        .spawn(move || {
            for update in updates.iter() {
                match update {
                    EngineUpdate::Playback { state } => println!("> {}", state.as_str()),
                    EngineUpdate::Loaded { file, load_time } => println!(
                        "> loaded {} in {}ms",
                        file.as_deref().unwrap_or("file"),
                        load_time.as_millis()
                    ),
                    EngineUpdate::Toggle { name, value } => {
                        println!("> {name} {}", if value { "on" } else { "off" })
                    }
                    EngineUpdate::Error { message } => println!("! {message}"),
                }
            }
        })?;

    println!("{HELP}");
    for line in std::io::stdin().lock().lines() {
        let line = line?;
        let mut words = line.split_whitespace();
        let command = match (words.next(), words.next()) {
            (None, _) => continue,
            (Some("load"), Some(file)) => EngineCommand::Load(config.midi_path(file)),
            (Some("play"), _) => EngineCommand::Play,
            (Some("pause"), _) => EngineCommand::Pause,
            (Some("stop"), _) => EngineCommand::Stop,
            (Some("note"), Some(pitch)) => match pitch.parse::<u8>() {
                Ok(pitch) => EngineCommand::Notes(vec![
                    NoteEvent::on(pitch, 1.0, 0),
                    NoteEvent::off(pitch, 250),
                ]),
                Err(_) => {
                    println!("! bad pitch: {pitch}");
                    continue;
                }
            },
            (Some("deblack"), _) => EngineCommand::ToggleDeblack,
            (Some("sustain"), _) => EngineCommand::ToggleSustain,
            (Some("status"), _) => {
                let snapshot = engine.snapshot();
                println!(
                    "{}",
                    snapshot.render("[{state}] {file} {elapsed}/{duration} | {nps} nps | {notes} notes | up {uptime}")
                );
                continue;
            }
            (Some("quit" | "exit"), _) => break,
            _ => {
                println!("{HELP}");
                continue;
            }
        };
        engine.send(command);
    }

    engine.shutdown();
    Ok(())
}
