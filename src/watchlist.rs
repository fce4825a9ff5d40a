use std::path::PathBuf;

use regex::RegexBuilder;
use tokio::fs;

use crate::error::BotError;

/// One flat-file watch-list. Lines are `NNN--- title`, numbered from 1;
/// deleting a line renumbers everything after it so positions stay
/// contiguous. The whole file is small enough to rewrite on every change.
#[derive(Debug, Clone)]
pub struct Watchlist {
    path: PathBuf,
}

fn format_line(pos: usize, title: &str) -> String {
    format!("{pos:03}--- {title}")
}

/// Title part of a stored line (everything after the `NNN--- ` prefix).
fn title_of(line: &str) -> &str {
    line.splitn(2, "--- ").nth(1).unwrap_or(line)
}

impl Watchlist {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// A list that has never been written to is just empty.
    async fn read_lines(&self) -> Result<Vec<String>, BotError> {
        match fs::read_to_string(&self.path).await {
            Ok(text) => Ok(text.lines().map(str::to_string).collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_lines(&self, lines: &[String]) -> Result<(), BotError> {
        let mut body = lines.join("\n");
        if !body.is_empty() {
            body.push('\n');
        }
        fs::write(&self.path, body).await?;
        Ok(())
    }

    pub async fn list_all(&self) -> Result<Vec<String>, BotError> {
        self.read_lines().await
    }

    /// Case-insensitive search over the stored lines. The pattern is used
    /// as a regex when it parses as one, verbatim text otherwise.
    pub async fn find(&self, pattern: &str) -> Result<Vec<String>, BotError> {
        let re = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .or_else(|_| {
                RegexBuilder::new(&regex::escape(pattern))
                    .case_insensitive(true)
                    .build()
            })
            .expect("escaped pattern always parses");

        Ok(self
            .read_lines()
            .await?
            .into_iter()
            .filter(|line| re.is_match(line))
            .collect())
    }

    pub async fn last_ten(&self) -> Result<Vec<String>, BotError> {
        let lines = self.read_lines().await?;
        let skip = lines.len().saturating_sub(10);
        Ok(lines[skip..].to_vec())
    }

    /// Appends and returns the new 1-based position.
    pub async fn add(&self, title: &str) -> Result<usize, BotError> {
        let mut lines = self.read_lines().await?;
        let pos = lines.len() + 1;
        lines.push(format_line(pos, title));
        self.write_lines(&lines).await?;
        Ok(pos)
    }

    pub async fn edit(&self, pos: usize, title: &str) -> Result<(), BotError> {
        let mut lines = self.read_lines().await?;
        if pos == 0 || pos > lines.len() {
            return Err(BotError::BadPosition(pos));
        }
        lines[pos - 1] = format_line(pos, title);
        self.write_lines(&lines).await
    }

    /// Removes the entry at `pos`, renumbers the tail, and returns the
    /// removed title.
    pub async fn delete(&self, pos: usize) -> Result<String, BotError> {
        let mut lines = self.read_lines().await?;
        if pos == 0 || pos > lines.len() {
            return Err(BotError::BadPosition(pos));
        }
        let removed = title_of(&lines.remove(pos - 1)).to_string();
        for (i, line) in lines.iter_mut().enumerate().skip(pos - 1) {
            *line = format_line(i + 1, &title_of(line).to_string());
        }
        self.write_lines(&lines).await?;
        Ok(removed)
    }

    /// Removes the last entry; returns its position and title.
    pub async fn delete_last(&self) -> Result<(usize, String), BotError> {
        let mut lines = self.read_lines().await?;
        let line = lines.pop().ok_or(BotError::EmptyList)?;
        self.write_lines(&lines).await?;
        Ok((lines.len() + 1, title_of(&line).to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded(titles: &[&str]) -> (tempfile::TempDir, Watchlist) {
        let dir = tempfile::tempdir().unwrap();
        let list = Watchlist::new(dir.path().join("movies.txt"));
        for t in titles {
            list.add(t).await.unwrap();
        }
        (dir, list)
    }

    #[tokio::test]
    async fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let list = Watchlist::new(dir.path().join("nope.txt"));
        assert!(list.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn add_numbers_lines_from_one() {
        let (_dir, list) = seeded(&["El laberinto del fauno", "Tesis"]).await;
        assert_eq!(
            list.list_all().await.unwrap(),
            vec!["001--- El laberinto del fauno", "002--- Tesis"]
        );
        assert_eq!(list.add("Celda 211").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn find_is_case_insensitive() {
        let (_dir, list) = seeded(&["El laberinto del fauno", "Tesis"]).await;
        let hits = list.find("TESIS").await.unwrap();
        assert_eq!(hits, vec!["002--- Tesis"]);
        assert!(list.find("nada").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_renumbers_the_tail() {
        let (_dir, list) = seeded(&["a", "b", "c", "d"]).await;
        let removed = list.delete(2).await.unwrap();
        assert_eq!(removed, "b");
        assert_eq!(
            list.list_all().await.unwrap(),
            vec!["001--- a", "002--- c", "003--- d"]
        );
    }

    #[tokio::test]
    async fn edit_replaces_in_place() {
        let (_dir, list) = seeded(&["a", "b"]).await;
        list.edit(2, "bb").await.unwrap();
        assert_eq!(list.list_all().await.unwrap(), vec!["001--- a", "002--- bb"]);
        assert!(matches!(
            list.edit(3, "x").await,
            Err(BotError::BadPosition(3))
        ));
    }

    #[tokio::test]
    async fn delete_last_pops_the_tail() {
        let (_dir, list) = seeded(&["a", "b"]).await;
        assert_eq!(list.delete_last().await.unwrap(), (2, "b".to_string()));
        assert_eq!(list.list_all().await.unwrap(), vec!["001--- a"]);
    }

    #[tokio::test]
    async fn delete_last_on_an_empty_list_says_so() {
        let (_dir, list) = seeded(&[]).await;
        assert!(matches!(list.delete_last().await, Err(BotError::EmptyList)));
    }

    #[tokio::test]
    async fn last_ten_keeps_only_the_tail() {
        let titles: Vec<String> = (1..=12).map(|i| format!("t{i}")).collect();
        let refs: Vec<&str> = titles.iter().map(String::as_str).collect();
        let (_dir, list) = seeded(&refs).await;
        let last = list.last_ten().await.unwrap();
        assert_eq!(last.len(), 10);
        assert_eq!(last.first().unwrap(), "003--- t3");
        assert_eq!(last.last().unwrap(), "012--- t12");
    }

    #[tokio::test]
    async fn out_of_range_positions_are_reported() {
        let (_dir, list) = seeded(&["a"]).await;
        assert!(matches!(list.delete(0).await, Err(BotError::BadPosition(0))));
        assert!(matches!(list.delete(5).await, Err(BotError::BadPosition(5))));
    }
}
