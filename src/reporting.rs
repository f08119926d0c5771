use trafficmode_core::ClassificationRecord;

/// Human-readable lines for one image: the winning label, then any
/// runner-up labels indented below it.
pub fn format_record(record: &ClassificationRecord) -> Vec<String> {
    if let Some(error) = &record.error {
        return vec![format!("{}: error: {}", record.source, error)];
    }

    let mut predictions = record.predictions.iter();
    let Some(best) = predictions.next() else {
        return vec![format!("{}: no prediction", record.source)];
    };

    let mut lines = vec![format!(
        "{}: {} ({:.1}%)",
        record.source,
        best.label,
        best.confidence * 100.0
    )];
    for (rank, prediction) in predictions.enumerate() {
        lines.push(format!(
            "  {}. {} ({:.1}%)",
            rank + 2,
            prediction.label,
            prediction.confidence * 100.0
        ));
    }
    lines
}

pub fn print_records(records: &[ClassificationRecord]) {
    for record in records {
        for line in format_record(record) {
            if record.error.is_some() {
                eprintln!("{}", line);
            } else {
                println!("{}", line);
            }
        }
    }
}
