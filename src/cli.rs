use clap::{arg, ArgAction, Command};
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build application cli. Every flag is optional; with none the smoke test
/// runs against whatever the settings file and environment point at.
pub fn cli() -> Command {
  Command::new("firestore-writer")
    .about("Artist/dataset Firestore writer smoke test")
    .version(VERSION)
    .author("instance.id")

    .arg( // --| Project Id ---------------------
      arg!(project: -p --project <Id> "The Google Cloud project id to write to"))

    .arg( // --| Credentials File ---------------
      arg!(credentials: -c --credentials <Path> "Path to a service account or authorized user json file"))

    .arg( // --| Settings File ------------------
      arg!(config: -C --config <Path> "Use this settings file instead of ~/.config/firestore-writer/settings.toml"))

    .arg( // --| Log level ----------------------
      arg!(level: -L --level <Name> "The log level to use")
      .value_parser(["error", "warn", "info", "debug"]))

    .arg( // --| In-memory store ----------------
      arg!(memory: -m --memory "Run against an in-process store instead of Firestore")
      .action(ArgAction::SetTrue))
}
