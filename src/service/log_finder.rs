// src/service/log_finder.rs

//! Line-oriented search over one job log file.

use std::fs;
use std::io;
use std::path::Path;

use regex::Regex;

use super::proto::SearchLogResult;
use crate::errors::Result;

#[derive(Debug, Clone)]
pub struct LogFinder {
    pattern: Option<Regex>,
    pagesize: usize,
    tail: bool,
}

impl LogFinder {
    /// An empty pattern matches every line; a zero page size means 1.
    pub fn new(pattern: &str, pagesize: usize) -> Result<Self> {
        let pattern = if pattern.is_empty() {
            None
        } else {
            Some(Regex::new(pattern)?)
        };
        Ok(Self {
            pattern,
            pagesize: pagesize.max(1),
            tail: false,
        })
    }

    /// Read backwards from the offset (newest lines first).
    pub fn tail(mut self, tail: bool) -> Self {
        self.tail = tail;
        self
    }

    fn matches(&self, line: &[u8]) -> bool {
        match &self.pattern {
            Some(re) => re.is_match(&String::from_utf8_lossy(line)),
            None => true,
        }
    }

    /// Search `path` starting at `offset`. A missing file yields an empty
    /// result, since a job may simply not have run that day.
    pub fn search(&self, path: &Path, offset: u64) -> Result<SearchLogResult> {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(SearchLogResult::default()),
            Err(e) => return Err(e.into()),
        };
        let file_size = data.len() as u64;
        let lines = line_spans(&data);

        let mut content = Vec::new();
        let mut found = 0;
        let next_offset = if self.tail {
            let start = if offset == 0 || offset > file_size { file_size } else { offset };
            let mut pos = start;
            for &(begin, end) in lines.iter().rev().filter(|(_, end)| *end as u64 <= start) {
                pos = begin as u64;
                if self.matches(&data[begin..end]) {
                    push_line(&mut content, &data[begin..end]);
                    found += 1;
                    if found == self.pagesize {
                        break;
                    }
                }
            }
            pos
        } else {
            let mut pos = offset.min(file_size);
            for &(begin, end) in lines.iter().filter(|(begin, _)| *begin as u64 >= offset) {
                pos = end as u64;
                if self.matches(&data[begin..end]) {
                    push_line(&mut content, &data[begin..end]);
                    found += 1;
                    if found == self.pagesize {
                        break;
                    }
                }
            }
            pos
        };

        Ok(SearchLogResult {
            content,
            offset: next_offset,
            file_size,
        })
    }
}

/// `(start, end)` byte spans of each line, newline included.
fn line_spans(data: &[u8]) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = 0;
    for (i, b) in data.iter().enumerate() {
        if *b == b'\n' {
            spans.push((start, i + 1));
            start = i + 1;
        }
    }
    if start < data.len() {
        spans.push((start, data.len()));
    }
    spans
}

fn push_line(out: &mut Vec<u8>, line: &[u8]) {
    out.extend_from_slice(line);
    if !line.ends_with(b"\n") {
        out.push(b'\n');
    }
}
