//! `#TOKEN#` substitution in output paths, export commands and guard references

use crate::types::Episode;
use crate::utils::{cut, sanitize_file_name};
use chrono::{DateTime, Local};

/// Channel (provider plugin) name
pub const CHANNEL: &str = "#CHANNEL#";
/// Category display name
pub const CATEGORY: &str = "#CATEGORY#";
/// Episode display name
pub const EPISODE: &str = "#EPISODE#";
/// Episode source identifier
pub const EPISODE_ID: &str = "#EPISODE_ID#";
/// Extension of the category's files
pub const EXTENSION: &str = "#EXTENSION#";
/// Current date, `YYYYMMDD`
pub const DATE: &str = "#DATE#";
/// Sanitized (and optionally cut) episode name
pub const FILE_NAME: &str = "#FILE_NAME#";
/// Path the download ended at, available to export commands
pub const DOWNLOAD_OUTPUT: &str = "#DOWNLOAD_OUTPUT#";

/// Replaces episode tokens in templates
#[derive(Clone, Debug)]
pub struct TokenReplacer {
    values: Vec<(&'static str, String)>,
}

impl TokenReplacer {
    /// Tokens describing an episode, dated now
    pub fn for_episode(episode: &Episode) -> Self {
        Self::for_episode_at(episode, Local::now(), None)
    }

    /// Tokens describing an episode at a fixed date with an optional file name cut
    pub fn for_episode_at(
        episode: &Episode,
        date: DateTime<Local>,
        file_name_cut_size: Option<usize>,
    ) -> Self {
        let file_name = cut(&sanitize_file_name(&episode.name), file_name_cut_size);
        Self {
            values: vec![
                (CHANNEL, episode.category.channel.clone()),
                (CATEGORY, sanitize_file_name(&episode.category.name)),
                (EPISODE_ID, episode.id.clone()),
                (EPISODE, episode.name.clone()),
                (EXTENSION, episode.category.extension.clone()),
                (DATE, date.format("%Y%m%d").to_string()),
                (FILE_NAME, file_name),
            ],
        }
    }

    /// Cut `#FILE_NAME#` to at most `size` characters
    pub fn with_cut_size(self, episode: &Episode, size: Option<usize>) -> Self {
        let file_name = cut(&sanitize_file_name(&episode.name), size);
        self.with_value(FILE_NAME, file_name)
    }

    /// Make `#DOWNLOAD_OUTPUT#` available
    pub fn with_download_output(self, output: impl Into<String>) -> Self {
        self.with_value(DOWNLOAD_OUTPUT, output.into())
    }

    fn with_value(mut self, token: &'static str, value: String) -> Self {
        match self.values.iter_mut().find(|(t, _)| *t == token) {
            Some(slot) => slot.1 = value,
            None => self.values.push((token, value)),
        }
        self
    }

    /// Substitute every known token in `template`
    ///
    /// Unknown tokens are left as they are.
    pub fn replace(&self, template: &str) -> String {
        let mut out = template.to_string();
        for (token, value) in &self.values {
            if out.contains(token) {
                out = out.replace(token, value);
            }
        }
        out
    }
}
