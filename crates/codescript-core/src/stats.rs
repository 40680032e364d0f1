use super::state::LogBuffer;
use super::state::LogSource;
use super::state::WorkspaceFile;

#[derive(Debug, Clone, PartialEq)]
pub struct LanguageShare {
    pub language: String,
    pub count: usize,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkspaceStats {
    pub file_count: usize,
    pub total_lines: usize,
    pub total_chars: usize,
    pub agent_tasks: usize,
    pub languages: Vec<LanguageShare>,
}

impl WorkspaceStats {
    pub fn compute<'a>(
        files: impl IntoIterator<Item = &'a WorkspaceFile>,
        logs: &LogBuffer,
    ) -> Self {
        let mut file_count = 0;
        let mut total_lines = 0;
        let mut total_chars = 0;
        let mut counts: Vec<(String, usize)> = Vec::new();
        for file in files {
            file_count += 1;
            total_lines += file.line_count();
            total_chars += file.content.chars().count();
            match counts.iter_mut().find(|(language, _)| *language == file.language) {
                Some((_, count)) => *count += 1,
                None => counts.push((file.language.clone(), 1)),
            }
        }
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let languages = counts
            .into_iter()
            .map(|(language, count)| LanguageShare {
                language,
                count,
                percent: count as f64 * 100.0 / file_count as f64,
            })
            .collect();

        Self {
            file_count,
            total_lines,
            total_chars,
            agent_tasks: logs
                .iter()
                .filter(|entry| entry.source == LogSource::User)
                .count(),
            languages,
        }
    }
}
