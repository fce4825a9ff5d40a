use std::path::PathBuf;
use std::time::Duration;

/// Results shown per page of a search browser.
pub const PAGE_SIZE: usize = 5;
/// Telegram caps inline keyboards at 8 buttons per row.
pub const MAX_ROW_WIDTH: usize = 8;
/// Bound on every outbound scrape/detail/standings fetch.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
/// FilmAffinity serves an error page to clients without a browser UA.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/101.0.4951.64 Safari/537.36 Edg/101.0.1210.53";

/// Which watch-list a command operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Movies,
    MoviesToSee,
    Series,
    SeriesToSee,
}

impl ListKind {
    /// Maps the command-line selectors (`-m`, `movies`, ...) to a list.
    pub fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "-m" | "movies" => Some(Self::Movies),
            "-mt" | "movies-to-see" => Some(Self::MoviesToSee),
            "-s" | "series" => Some(Self::Series),
            "-st" | "series-to-see" => Some(Self::SeriesToSee),
            _ => None,
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            Self::Movies => "movies.txt",
            Self::MoviesToSee => "movies_to_see.txt",
            Self::Series => "series.txt",
            Self::SeriesToSee => "series_to_see.txt",
        }
    }

    /// Human label used in confirmations ("Movies #3 añadida: ...").
    pub fn label(self) -> &'static str {
        match self {
            Self::Movies => "Movies",
            Self::MoviesToSee => "Movies to see",
            Self::Series => "Series",
            Self::SeriesToSee => "Series to see",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Fixed allow-list of chats the bot answers to.
    pub allowed_chats: Vec<i64>,
    /// Directory holding the four watch-list files.
    pub files_dir: PathBuf,
    /// Directory holding one JSON file per active search session.
    pub searches_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let allowed_chats = std::env::var("ALLOWED_CHAT_IDS")
            .map_err(|_| anyhow::anyhow!("ALLOWED_CHAT_IDS is missing"))?
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.trim().parse::<i64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| anyhow::anyhow!("ALLOWED_CHAT_IDS: {e}"))?;

        let files_dir =
            PathBuf::from(std::env::var("FILES_DIR").unwrap_or_else(|_| "./files".to_string()));
        let searches_dir = PathBuf::from(
            std::env::var("SEARCHES_DIR").unwrap_or_else(|_| "./searches".to_string()),
        );

        Ok(Self {
            allowed_chats,
            files_dir,
            searches_dir,
        })
    }

    pub fn list_path(&self, kind: ListKind) -> PathBuf {
        self.files_dir.join(kind.file_name())
    }
}
