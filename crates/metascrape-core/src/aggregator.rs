use crate::error::AppError;
use crate::models::{Extraction, Field, FieldFailure, Record, Slot};
use crate::traits::SiteAdapter;

/// Run one extraction: fetch → parse → per-field capabilities → follow-ups.
///
/// Only the root fetch and parse are fatal. Every capability failure is
/// logged, recorded in [`Extraction::failures`] and leaves its field empty.
pub async fn harvest<A: SiteAdapter>(adapter: &A, uri: &str) -> Result<Extraction, AppError> {
    let site = adapter.site();
    let mut record = Record::new(uri)?;
    let mut failures = Vec::new();

    tracing::info!(%site, %uri, "Fetching root document");
    let body = adapter.fetch_root(uri).await?;
    tracing::info!(%site, bytes = body.len(), "Fetched root document");

    // The parsed document stays inside this block so it never lives across
    // an await point.
    let follow_ups = {
        let doc = adapter.parse(uri, &body)?;
        for &field in adapter.fields() {
            extract_field(adapter, &doc, field, &mut record, &mut failures);
        }
        adapter.follow_ups(uri, &doc)
    };

    for follow_up in follow_ups {
        let patch = adapter.resolve(follow_up).await;
        for failure in record.merge(patch) {
            note(site, uri, failure, &mut failures);
        }
    }

    tracing::info!(
        %site,
        %uri,
        failed_fields = failures.len(),
        "Extraction complete"
    );

    Ok(Extraction { record, failures })
}

fn extract_field<A: SiteAdapter>(
    adapter: &A,
    doc: &A::Document,
    field: Field,
    record: &mut Record,
    failures: &mut Vec<FieldFailure>,
) {
    let outcome = match field {
        Field::Name => settle(&mut record.name, adapter.extract_name(doc)),
        Field::Brand => settle(&mut record.brand, adapter.extract_brand(doc)),
        Field::ReleaseDate => settle(&mut record.release_date, adapter.extract_release_date(doc)),
        Field::Link => settle(&mut record.link, adapter.extract_link(doc)),
        Field::Story => settle(&mut record.story, adapter.extract_story(doc)),
        Field::Size => settle(&mut record.size, adapter.extract_size(doc)),
        Field::OtherInfo => settle(&mut record.other_info, adapter.extract_other_info(doc)),
        Field::WalkThrough => settle(&mut record.walkthrough, adapter.extract_walkthrough(doc)),
        Field::SaveData => settle(&mut record.save_data, adapter.extract_save_data(doc)),
        Field::Preview => settle(&mut record.preview, adapter.extract_preview(doc)),
        Field::Genre => settle(&mut record.genre, adapter.extract_genre(doc)),
        Field::Information => settle(&mut record.information, adapter.extract_information(doc)),
        Field::Tags => settle(&mut record.tags, adapter.extract_tags(doc)),
        Field::Characters => settle(&mut record.characters, adapter.extract_characters(doc)),
        // Only produced by follow-ups.
        Field::Magnet | Field::BtFile => Err(AppError::Unsupported(field)),
    };

    if let Err(error) = outcome {
        note(
            adapter.site(),
            record.origin(),
            FieldFailure { field, error },
            failures,
        );
    }
}

fn settle<T: Slot>(slot: &mut T, outcome: Result<T, AppError>) -> Result<(), AppError> {
    let value = outcome?;
    if !slot.fill(value) {
        tracing::debug!("Kept earlier value");
    }
    Ok(())
}

fn note(site: &str, uri: &str, failure: FieldFailure, failures: &mut Vec<FieldFailure>) {
    tracing::warn!(
        %site,
        %uri,
        field = %failure.field,
        error = %failure.error,
        "Field extraction failed"
    );
    failures.push(failure);
}
