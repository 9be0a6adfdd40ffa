use crate::db::*;
use crate::error::DatabaseError;
use crate::types::{Artifact, CompletionStatus, CursorTriple, Input, Notice, Report, Voucher};
use tempfile::NamedTempFile;

mod progress;

async fn open_db() -> (NamedTempFile, Database) {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();
    (temp_file, db)
}

fn cursors(outputs: Option<&str>, inputs: Option<&str>, reports: Option<&str>) -> CursorTriple {
    CursorTriple {
        outputs: outputs.map(str::to_string),
        inputs: inputs.map(str::to_string),
        reports: reports.map(str::to_string),
    }
}

fn voucher(input_index: u64, output_index: u64) -> Artifact {
    Artifact::Voucher(Voucher {
        input_index,
        output_index,
        destination: "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266".to_string(),
        value: "1000".to_string(),
        payload: "0x237a816f00".to_string(),
        executed: false,
        proof: None,
    })
}

fn notice(input_index: u64, output_index: u64) -> Artifact {
    Artifact::Notice(Notice {
        input_index,
        output_index,
        payload: "0xc258d6e500".to_string(),
        proof: None,
    })
}

fn input(index: u64) -> Artifact {
    Artifact::Input(Input {
        index,
        blob: format!("0x{:02x}", index),
        status: CompletionStatus::Unprocessed,
        metadata: None,
    })
}

fn report(input_index: u64, index: u64) -> Artifact {
    Artifact::Report(Report {
        input_index,
        index,
        blob: "0xdeadbeef".to_string(),
    })
}
