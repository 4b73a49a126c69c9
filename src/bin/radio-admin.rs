use std::env;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use dotenv::dotenv;
use log::{debug, info, initialize_logger, warn, Logger};
use structopt::StructOpt;

use radio::audio::{Ffmpeg, Ffprobe};
use radio::client::player::Headless;
use radio::client::{
    BoundaryPolicy, Playlist, Player, RecordingForm, RemoteDb, RemoteStore, SelectedFile,
    Station, UploadSession, Uploader,
};
use radio::config::{find_tool, get_variable, Limits};
use radio::recording::{Id, Recording, RecordingDraft};
use radio::urls::Urls;

#[derive(Debug, StructOpt)]
#[structopt(name = "radio-admin", about = "Manage the station's recordings")]
enum Command {
    /// Print the playlist, most recent first
    List,

    /// Upload a file and add it to the playlist
    Add {
        /// The audio file to upload
        #[structopt(parse(from_os_str))]
        file: PathBuf,

        #[structopt(flatten)]
        fields: Fields,
    },

    /// Change a recording, optionally replacing its audio
    Edit {
        id: Id,

        /// A new audio file to upload in place of the current one
        #[structopt(long, parse(from_os_str))]
        file: Option<PathBuf>,

        #[structopt(flatten)]
        fields: Fields,
    },

    /// Remove a recording
    Remove { id: Id },

    /// Remove every recording
    Clear,
}

#[derive(Debug, StructOpt)]
struct Fields {
    /// Defaults to the file name
    #[structopt(long)]
    title: Option<String>,

    #[structopt(long)]
    description: Option<String>,

    /// Defaults to today
    #[structopt(long)]
    date: Option<String>,

    /// Defaults to the measured length, if ffprobe is available
    #[structopt(long)]
    duration: Option<String>,
}

impl Fields {
    /// Layers the given fields over `base`.
    fn over(self, base: RecordingDraft) -> RecordingDraft {
        RecordingDraft {
            title: self.title.or(base.title),
            description: self.description.or(base.description),
            date: self.date.or(base.date),
            duration: self.duration.or(base.duration),
            url: base.url,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();

    let command = Command::from_args();

    let logger = Arc::new(initialize_logger());
    let mut station = make_station(logger.clone())?;

    match command {
        Command::List => {
            station.refresh().await?;
        }
        Command::Add { file, fields } => {
            let session = start_session(&logger, file).await?;
            let form = RecordingForm::new(fields.over(RecordingDraft::default()));

            let created = station.add(form.with_upload(session)).await?;
            info!(logger, "Added recording"; "id" => created.id, "url" => %created.url);
        }
        Command::Edit { id, file, fields } => {
            station.refresh().await?;

            let mut current = station
                .playlist()
                .recordings()
                .into_iter()
                .find(|r| r.id == id)
                .map(|r| draft_from(&r))
                .unwrap_or_default();

            // new audio gets measured again
            if file.is_some() {
                current.duration = None;
            }

            let mut form = RecordingForm::new(fields.over(current));

            if let Some(file) = file {
                form = form.with_upload(start_session(&logger, file).await?);
            }

            let updated = station.edit(id, form).await?;
            info!(logger, "Updated recording"; "id" => updated.id);
        }
        Command::Remove { id } => {
            station.remove(id).await?;
            info!(logger, "Removed recording"; "id" => id);
        }
        Command::Clear => {
            let result = station.clear().await;

            if let Err(e) = &result {
                warn!(logger, "Some recordings were not removed"; "error" => %e);
            }

            let removed = result?;
            info!(logger, "Removed every recording"; "count" => removed.len());
        }
    }

    print_playlist(station.playlist().recordings());

    Ok(())
}

fn make_station(logger: Arc<Logger>) -> Result<Station<Headless>, Box<dyn Error>> {
    let client = reqwest::Client::builder()
        .user_agent(format!("{}/{}", info::NAME, info::VERSION))
        .build()?;

    let urls = Arc::new(Urls::new(
        get_variable("RADIO_SERVER_URL"),
        env::var("RADIO_RECORDINGS_PATH").unwrap_or_else(|_| "recordings".to_owned()),
        env::var("RADIO_UPLOAD_PATH").unwrap_or_else(|_| "upload".to_owned()),
    ));

    let db = Arc::new(RemoteDb::new(client.clone(), urls.clone()));
    let store = Arc::new(RemoteStore::new(client, urls));

    let mut uploader = Uploader::new(logger.clone(), store, Limits::from_env());

    match find_tool("ffprobe", env::var("RADIO_FFPROBE_PATH").ok()) {
        Some(path) => uploader = uploader.with_prober(Arc::new(Ffprobe::new(path))),
        None => debug!(logger, "ffprobe not found; durations will not be measured"),
    }

    match find_tool("ffmpeg", env::var("RADIO_FFMPEG_PATH").ok()) {
        Some(path) => uploader = uploader.with_reducer(Arc::new(Ffmpeg::new(path))),
        None => debug!(logger, "ffmpeg not found; large files will not be reduced"),
    }

    let playlist = Playlist::new(logger.clone(), db);
    let player = Player::new(Headless::new(), BoundaryPolicy::default());

    Ok(Station::new(logger, uploader, playlist, player))
}

/// Reads the file and prints transfer progress to stderr. Interrupting
/// the program cancels the transfer.
async fn start_session(logger: &Logger, path: PathBuf) -> Result<UploadSession, Box<dyn Error>> {
    let file = SelectedFile::from_path(&path).await?;
    debug!(logger, "Read file"; "path" => %path.display(), "size" => file.size(), "content_type" => file.content_type());

    let session = UploadSession::new(file);
    let mut progress = session.progress();
    let canceller = session.canceller();

    tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            eprint!("\ruploading: {:>3}%", *progress.borrow());
        }

        eprintln!();
    });

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            canceller.cancel();
        }
    });

    Ok(session)
}

fn draft_from(recording: &Recording) -> RecordingDraft {
    RecordingDraft {
        title: Some(recording.title.clone()),
        description: Some(recording.description.clone()).filter(|d| !d.is_empty()),
        date: Some(recording.date.clone()),
        duration: Some(recording.duration.clone()),
        url: Some(recording.url.to_string()),
    }
}

fn print_playlist(recordings: Vec<Recording>) {
    if recordings.is_empty() {
        println!("(no recordings)");
        return;
    }

    for recording in recordings {
        println!(
            "{:>6}  {}  {:>8}  {}  {}",
            recording.id, recording.date, recording.duration, recording.title, recording.url
        );
    }
}
