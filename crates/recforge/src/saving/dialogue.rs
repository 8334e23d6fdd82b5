use crate::codec::RecordKind;
use crate::document::{read_document, Collection, Data, Info, Scope};
use crate::error::StageError;
use crate::messages::Messages;
use crate::operation::Stage;

use super::state::SaveContext;

fn saved_info(infos: &Collection<Info>, index: usize) -> bool {
    infos
        .get(index)
        .map(|r| r.is_dirty() && Scope::of(&r.id) == Scope::Content)
        .unwrap_or(false)
}

/// Id of the nearest live info before (`forward == false`) or after
/// `position` in `range`.
fn live_neighbour(infos: &Collection<Info>, range: &[usize], position: usize, forward: bool) -> String {
    let live = |i: &&usize| infos.get(**i).map(|r| !r.is_deleted()).unwrap_or(false);
    let found = if forward {
        range[position + 1..].iter().find(live)
    } else {
        range[..position].iter().rev().find(live)
    };
    found
        .and_then(|&i| infos.get(i))
        .map(|r| r.id.clone())
        .unwrap_or_default()
}

/// Writes topics whose record or infos changed, each followed by its dirty
/// infos with `prev`/`next` relinked.
pub struct WriteDialogueCollectionStage;

impl Stage<SaveContext> for WriteDialogueCollectionStage {
    fn setup(&mut self, context: &mut SaveContext) -> Result<usize, StageError> {
        let doc = read_document(&context.document)?;
        Ok(doc.data.topics.len())
    }

    fn perform(
        &mut self,
        step: usize,
        context: &mut SaveContext,
        _messages: &mut Messages,
    ) -> Result<(), StageError> {
        let doc = read_document(&context.document)?;
        let data = &doc.data;
        let Some(topic) = data.topics.get(step) else {
            return Ok(());
        };
        if Scope::of(&topic.id) != Scope::Content {
            return Ok(());
        }

        let range = data.topic_infos(&topic.id);
        let infos_changed = range.iter().any(|&i| saved_info(&data.infos, i));
        if !topic.is_dirty() && !infos_changed {
            return Ok(());
        }

        let writer = context.state.writer()?;
        writer.start_record(RecordKind::Dialogue, &topic.id)?;
        if topic.is_deleted() {
            writer.mark_deleted()?;
        } else if topic.is_modified() {
            writer.write_body(topic.get())?;
        } else {
            writer.write_body(topic.base_value())?;
        }
        writer.end_record()?;

        for (position, &index) in range.iter().enumerate() {
            if !saved_info(&data.infos, index) {
                continue;
            }
            let Some(record) = data.infos.get(index) else {
                continue;
            };
            writer.start_record(RecordKind::Info, &record.id)?;
            if record.is_deleted() {
                writer.mark_deleted()?;
            } else {
                let mut info = record.get().clone();
                info.prev = live_neighbour(&data.infos, &range, position, false);
                info.next = live_neighbour(&data.infos, &range, position, true);
                writer.write_body(&info)?;
            }
            writer.end_record()?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "write dialogue"
    }
}

/// Topics and infos the dialogue stage writes for `data`.
pub fn dialogue_record_count(data: &Data) -> usize {
    data.topics
        .iter()
        .filter(|topic| Scope::of(&topic.id) == Scope::Content)
        .map(|topic| {
            let infos = data
                .topic_infos(&topic.id)
                .into_iter()
                .filter(|&i| saved_info(&data.infos, i))
                .count();
            if topic.is_dirty() || infos > 0 {
                1 + infos
            } else {
                0
            }
        })
        .sum()
}
