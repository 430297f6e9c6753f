use log::debug;

use super::controller::{FormController, FormError, FormResult, read_lock, write_lock};
use super::model::FieldModel;
use super::path::{FieldPath, IntoFieldPath};
use super::schema::FieldKind;
use super::value::{EntryId, FieldArrayEntry, FieldValue};

impl FormController {
    /// Entries of a field array in order, for rendering keyed by id.
    /// Unknown paths yield no entries.
    pub fn list_entries(&self, path: impl IntoFieldPath) -> FormResult<Vec<FieldArrayEntry>> {
        let path = path.into_field_path()?;
        let state = read_lock(&self.state, "reading field array entries")?;
        let Some(canonical) = state.values.canonicalize(&path) else {
            return Ok(Vec::new());
        };
        match state.values.get(&canonical) {
            Some(FieldValue::Entries(entries)) => Ok(entries.clone()),
            _ => Err(FormError::NotAFieldArray(canonical)),
        }
    }

    /// Appends a group to a field array under a fresh id. Members the item
    /// shape declares but `value` omits start empty.
    pub fn append_list_entry(
        &self,
        path: impl IntoFieldPath,
        value: impl Into<FieldValue>,
    ) -> FormResult<EntryId> {
        let path = path.into_field_path()?;
        let path = self
            .canonical_path(&path)?
            .ok_or_else(|| FormError::UnknownPath(path.clone()))?;
        let Some(FieldKind::FieldArray(item_kind)) = self.schema.kind_at(&path) else {
            return Err(FormError::NotAFieldArray(path));
        };

        let mut value = value.into();
        if !matches!(value, FieldValue::Group(_)) || !item_kind.accepts(&value) {
            return Err(FormError::EntryShapeMismatch(path));
        }
        item_kind.fill_missing(&mut value);

        let entry = FieldArrayEntry::new(value);
        let id = entry.id;
        {
            let mut state = write_lock(&self.state, "appending field array entry")?;
            let Some(FieldValue::Entries(entries)) = state.values.get_mut(&path) else {
                return Err(FormError::NotAFieldArray(path));
            };
            entries.push(entry);
            state.refresh_dirty(&path);
        }
        debug!("appended entry {id} to `{path}`");
        self.notify(&path)?;
        Ok(id)
    }

    pub fn append_list_model<M: FieldModel>(
        &self,
        path: impl IntoFieldPath,
        model: &M,
    ) -> FormResult<EntryId> {
        self.append_list_entry(path, model.to_value())
    }

    /// Removes the entry with `id` together with its errors, metadata and
    /// per-entry registrations. Unknown paths and ids are ignored.
    pub fn remove_list_entry(&self, path: impl IntoFieldPath, id: EntryId) -> FormResult<()> {
        let path = path.into_field_path()?;
        let Some(path) = self.canonical_path(&path)? else {
            debug!("remove_list_entry ignored unknown path `{path}`");
            return Ok(());
        };

        {
            let mut state = write_lock(&self.state, "removing field array entry")?;
            if !matches!(state.values.get(&path), Some(FieldValue::Entries(_))) {
                return Err(FormError::NotAFieldArray(path));
            }
            if !state.values.remove_entry(&path, id) {
                debug!("remove_list_entry ignored unknown entry {id} of `{path}`");
                return Ok(());
            }
            state.forget_subtree(&path.clone().entry(id));
            state.refresh_dirty(&path);
        }
        self.forget_entry_registrations(&path.clone().entry(id))?;
        debug!("removed entry {id} from `{path}`");
        self.notify(&path)
    }

    /// Moves the entry with `id` to position `to` (clamped to the end).
    /// Ids are unchanged, so errors and registrations follow the entry.
    pub fn move_list_entry(
        &self,
        path: impl IntoFieldPath,
        id: EntryId,
        to: usize,
    ) -> FormResult<()> {
        let path = path.into_field_path()?;
        let Some(path) = self.canonical_path(&path)? else {
            debug!("move_list_entry ignored unknown path `{path}`");
            return Ok(());
        };

        {
            let mut state = write_lock(&self.state, "moving field array entry")?;
            let Some(FieldValue::Entries(entries)) = state.values.get_mut(&path) else {
                return Err(FormError::NotAFieldArray(path));
            };
            let Some(from) = entries.iter().position(|entry| entry.id == id) else {
                return Ok(());
            };
            let entry = entries.remove(from);
            let to = to.min(entries.len());
            entries.insert(to, entry);
            state.refresh_dirty(&path);
        }
        self.notify(&path)
    }

    fn forget_entry_registrations(&self, prefix: &FieldPath) -> FormResult<()> {
        write_lock(&self.rules, "dropping entry registrations")?
            .retain(|path, _| path.is_template() || !path.starts_with(prefix));
        Ok(())
    }
}
