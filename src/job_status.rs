//! Parses the transfer engine's free-form `jobs -v` output into structured
//! job records. Tolerant of a couple of consecutive garbled reads — the
//! engine occasionally interleaves partial terminal redraws with real
//! output — but gives up and surfaces an error on the third in a row.

use regex::Regex;
use std::sync::LazyLock;

use crate::error::ParseError;

/// How many consecutive unparseable reads are swallowed as empty results
/// before `parse` starts returning `Err`.
const MAX_CONSECUTIVE_STATUS_ERRORS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobType {
    Pget,
    Mirror,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Queued,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobFlag {
    Initializing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobStatus {
    pub id: u32,
    pub name: String,
    pub job_type: JobType,
    pub state: JobState,
    pub flags: Vec<JobFlag>,
    pub total_size: u64,
    pub transferred_size: u64,
    pub speed: Option<u64>,
    pub eta: Option<u64>,
    pub percent_complete: Option<u8>,
}

static JOB_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\[(\d+)\]\s+(pget|mirror)\s+.*-c\s+"((?:[^"\\]|\\.)*)""#).unwrap());
static QUEUE_HEADER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^Queue:\s*$").unwrap());
static CHUNK_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`-\d+\s+\d+%.*?(\d+)/(\d+)\s+(\d+)/s\s+eta:(\S+)").unwrap());
static SUMMARY_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)/(\d+)\s+\((\d+)%\)\s+(\d+)/s\s+eta:(\S+)\s*$").unwrap());
static GETTING_FILE_LIST: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Getting file list").unwrap());

pub struct JobStatusParser {
    consecutive_errors: u32,
}

impl Default for JobStatusParser {
    fn default() -> Self {
        Self::new()
    }
}

impl JobStatusParser {
    pub fn new() -> Self {
        JobStatusParser { consecutive_errors: 0 }
    }

    pub fn parse(&mut self, raw: &str) -> Result<Vec<JobStatus>, ParseError> {
        match parse_jobs(raw) {
            Ok(jobs) => {
                self.consecutive_errors = 0;
                Ok(jobs)
            }
            Err(msg) => {
                self.consecutive_errors += 1;
                if self.consecutive_errors <= MAX_CONSECUTIVE_STATUS_ERRORS {
                    Ok(Vec::new())
                } else {
                    Err(ParseError::Unparseable(msg))
                }
            }
        }
    }
}

fn job_name(quoted_path: &str) -> String {
    let unescaped = quoted_path.replace("\\\"", "\"").replace("\\\\", "\\");
    unescaped.rsplit('/').next().unwrap_or(&unescaped).to_string()
}

fn parse_eta(text: &str) -> Option<u64> {
    text.strip_suffix('s').and_then(|s| s.parse().ok())
}

fn parse_jobs(raw: &str) -> Result<Vec<JobStatus>, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let lines: Vec<&str> = trimmed.lines().collect();
    let mut jobs = Vec::new();
    let mut in_queue = false;
    let mut saw_any_marker = false;
    let mut i = 0usize;

    while i < lines.len() {
        let line = lines[i];
        if QUEUE_HEADER.is_match(line.trim()) {
            in_queue = true;
            saw_any_marker = true;
            i += 1;
            continue;
        }
        if let Some(caps) = JOB_HEADER.captures(line.trim()) {
            saw_any_marker = true;
            let id: u32 = caps[1].parse().map_err(|_| "job id is not an integer".to_string())?;
            let job_type = if &caps[2] == "pget" { JobType::Pget } else { JobType::Mirror };
            let name = job_name(&caps[3]);
            let state = if in_queue { JobState::Queued } else { JobState::Running };

            let mut flags = Vec::new();
            let mut total_size = 0u64;
            let mut transferred_size = 0u64;
            let mut speed: Option<u64> = None;
            let mut eta: Option<u64> = None;
            let mut percent_complete: Option<u8> = None;

            if state == JobState::Running {
                let mut j = i + 1;
                let mut chunk_total = 0u64;
                let mut chunk_transferred = 0u64;
                let mut chunk_speed_sum = 0u64;
                let mut saw_chunk = false;
                while j < lines.len() {
                    let detail = lines[j];
                    if JOB_HEADER.is_match(detail.trim()) || QUEUE_HEADER.is_match(detail.trim()) {
                        break;
                    }
                    if GETTING_FILE_LIST.is_match(detail) {
                        flags.push(JobFlag::Initializing);
                    } else if let Some(caps) = CHUNK_LINE.captures(detail) {
                        saw_chunk = true;
                        chunk_transferred += caps[1].parse::<u64>().unwrap_or(0);
                        chunk_total += caps[2].parse::<u64>().unwrap_or(0);
                        chunk_speed_sum += caps[3].parse::<u64>().unwrap_or(0);
                        eta = parse_eta(&caps[4]);
                    } else if let Some(caps) = SUMMARY_LINE.captures(detail) {
                        transferred_size = caps[1].parse().unwrap_or(0);
                        total_size = caps[2].parse().unwrap_or(0);
                        percent_complete = caps[3].parse().ok();
                        speed = caps[4].parse().ok();
                        eta = parse_eta(&caps[5]);
                    }
                    j += 1;
                }
                if saw_chunk {
                    transferred_size = chunk_transferred;
                    total_size = chunk_total;
                    speed = Some(chunk_speed_sum);
                    if total_size > 0 {
                        percent_complete = Some(((chunk_transferred * 100) / total_size) as u8);
                    }
                }
                i = j;
            } else {
                i += 1;
            }

            jobs.push(JobStatus {
                id,
                name,
                job_type,
                state,
                flags,
                total_size,
                transferred_size,
                speed,
                eta,
                percent_complete,
            });
            continue;
        }
        i += 1;
    }

    if jobs.is_empty() && !saw_any_marker && !GETTING_FILE_LIST.is_match(trimmed) {
        return Err(format!("no recognisable job entries in output: {trimmed}"));
    }

    Ok(jobs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_running_job_with_chunks() {
        let raw = "[0] pget -c \"/remote/data/movie.mkv\" -o \"/local/data/\"\n  \
                   `-0 12% |***|  1234567/9876543 102400/s eta:83s\n  \
                   `-1 100% |***| 9876543/9876543 0/s eta:0s\n";
        let mut parser = JobStatusParser::new();
        let jobs = parser.parse(raw).expect("parse");
        assert_eq!(jobs.len(), 1);
        let job = &jobs[0];
        assert_eq!(job.id, 0);
        assert_eq!(job.name, "movie.mkv");
        assert_eq!(job.job_type, JobType::Pget);
        assert_eq!(job.state, JobState::Running);
        assert_eq!(job.transferred_size, 1234567 + 9876543);
        assert_eq!(job.total_size, 9876543 + 9876543);
        assert_eq!(job.speed, Some(102400));
    }

    #[test]
    fn parses_running_job_with_summary_line() {
        let raw = "[1] mirror -c \"/remote/data/show\" -o \"/local/\"\n  \
                   2345678/5000000 (46%) 204800/s eta:12s\n";
        let mut parser = JobStatusParser::new();
        let jobs = parser.parse(raw).expect("parse");
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].job_type, JobType::Mirror);
        assert_eq!(jobs[0].total_size, 5000000);
        assert_eq!(jobs[0].transferred_size, 2345678);
        assert_eq!(jobs[0].percent_complete, Some(46));
        assert_eq!(jobs[0].eta, Some(12));
    }

    #[test]
    fn parses_queued_job_without_progress() {
        let raw = "Queue:\n  [2] pget -c \"/remote/data/other.iso\" -o \"/local/data/\"\n";
        let mut parser = JobStatusParser::new();
        let jobs = parser.parse(raw).expect("parse");
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].state, JobState::Queued);
        assert_eq!(jobs[0].total_size, 0);
    }

    #[test]
    fn marks_initializing_while_getting_file_list() {
        let raw = "[0] mirror -c \"/remote/data/show\" -o \"/local/\"\n  Getting file list\n";
        let mut parser = JobStatusParser::new();
        let jobs = parser.parse(raw).expect("parse");
        assert_eq!(jobs[0].flags, vec![JobFlag::Initializing]);
    }

    #[test]
    fn empty_output_means_no_jobs() {
        let mut parser = JobStatusParser::new();
        assert_eq!(parser.parse("").unwrap(), Vec::new());
    }

    #[test]
    fn is_order_preserving_for_multiple_jobs() {
        let raw = "[0] pget -c \"/r/a\" -o \"/l/\"\n  1/2 (50%) 1/s eta:1s\n\
                   [1] mirror -c \"/r/b\" -o \"/l/\"\n  3/4 (75%) 1/s eta:1s\n";
        let mut parser = JobStatusParser::new();
        let jobs = parser.parse(raw).unwrap();
        assert_eq!(jobs.iter().map(|j| j.name.clone()).collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn tolerates_two_consecutive_unparseable_reads_then_errors_on_third() {
        let mut parser = JobStatusParser::new();
        assert_eq!(parser.parse("garbage one").unwrap(), Vec::new());
        assert_eq!(parser.parse("garbage two").unwrap(), Vec::new());
        assert!(parser.parse("garbage three").is_err());
    }

    #[test]
    fn a_valid_parse_resets_the_error_counter() {
        let mut parser = JobStatusParser::new();
        assert_eq!(parser.parse("garbage one").unwrap(), Vec::new());
        assert_eq!(parser.parse("").unwrap(), Vec::new());
        assert_eq!(parser.parse("garbage two").unwrap(), Vec::new());
        assert_eq!(parser.parse("garbage three").unwrap(), Vec::new());
    }
}
