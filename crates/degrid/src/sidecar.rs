use std::fs;
use std::io;
use std::path::Path;

use serde::Deserialize;

use crate::error::FrameError;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SidecarDocument {
    Cloud {
        #[serde(rename = "readResult")]
        read_result: ReadResult,
    },
    Flat {
        lines: Vec<String>,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ReadResult {
    blocks: Vec<Block>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Block {
    lines: Vec<Line>,
}

#[derive(Debug, Deserialize)]
struct Line {
    #[serde(default)]
    text: String,
}

/// Upper-cased text lines from an OCR sidecar; geometry fields are ignored.
pub fn read_sidecar(path: &Path) -> Result<Vec<String>, FrameError> {
    let contents = fs::read_to_string(path).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => FrameError::MissingInput {
            path: path.to_path_buf(),
        },
        _ => FrameError::Io {
            path: path.to_path_buf(),
            source,
        },
    })?;
    parse_sidecar(&contents).map_err(|source| FrameError::MalformedSidecar {
        path: path.to_path_buf(),
        source,
    })
}

pub fn parse_sidecar(contents: &str) -> Result<Vec<String>, serde_json::Error> {
    let document: SidecarDocument = serde_json::from_str(contents)?;
    let lines = match document {
        SidecarDocument::Cloud { read_result } => read_result
            .blocks
            .into_iter()
            .flat_map(|block| block.lines)
            .map(|line| line.text)
            .collect(),
        SidecarDocument::Flat { lines } => lines,
    };
    Ok(lines
        .into_iter()
        .map(|line| line.trim().to_uppercase())
        .filter(|line| !line.is_empty())
        .collect())
}
