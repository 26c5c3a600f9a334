use std::collections::HashSet;

use chrono::{NaiveDateTime, Utc};

use crate::format;
use crate::rating;
use crate::supabase::AlertRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

impl SortOrder {
    pub fn toggled(self) -> Self {
        match self {
            SortOrder::NewestFirst => SortOrder::OldestFirst,
            SortOrder::OldestFirst => SortOrder::NewestFirst,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SortOrder::NewestFirst => "newest first",
            SortOrder::OldestFirst => "oldest first",
        }
    }
}

/// Poster/capture affordance of one card.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PosterState {
    Missing,
    /// A previously stored thumbnail was found for this alert.
    Stored { offset_seconds: f64 },
    /// A frame captured this session; `placeholder` marks the generated
    /// stand-in used when the frame pixels could not be read.
    Captured {
        offset_seconds: f64,
        placeholder: bool,
    },
}

impl PosterState {
    pub fn is_captured(&self) -> bool {
        !matches!(self, PosterState::Missing)
    }
}

#[derive(Debug, Clone)]
pub struct Summary {
    pub tema: String,
    pub contexto: String,
    pub puntos: String,
    pub relevancia: String,
}

/// Display fields derived once from an alert record.
#[derive(Debug, Clone)]
pub struct CardView {
    pub program_name: String,
    pub rating: u32,
    pub headline_term: String,
    pub terms: Vec<String>,
    pub short_date: String,
    pub time_label: String,
    pub tooltip: String,
    pub summary: Summary,
    pub video_url: Option<String>,
    pub transcription: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct SearchFields {
    term: String,
    note: String,
    context: String,
    transcription: String,
}

/// One rendered alert: the backend record plus local presentation state.
#[derive(Debug, Clone)]
pub struct FeedItem {
    pub record: AlertRecord,
    pub card: CardView,
    search: SearchFields,
    pub sort_date: NaiveDateTime,
    pub hidden: bool,
    pub expanded: bool,
    pub poster: PosterState,
}

const FALLBACK_CONTEXT: &str = "Se detectó contenido relevante en el programa.";
const FALLBACK_RELEVANCE: &str =
    "Esta mención es significativa para el monitoreo de contenido y puede requerir seguimiento adicional.";
const FALLBACK_TOOLTIP: &str = "Sin contexto disponible";
const TOOLTIP_MAX_CHARS: usize = 150;

impl FeedItem {
    /// Pure record -> view-model mapping. The rating is drawn here, once,
    /// so re-renders of the same item show a stable number.
    pub fn from_record(record: AlertRecord) -> Self {
        let program_name = format::extract_program_name(record.nombre_archivo.as_deref());
        let rating = rating::rating_for_program(&program_name);
        let terms = record.terms();
        let headline_term = terms
            .first()
            .map(|term| format::capitalize_first(term))
            .unwrap_or_else(|| "Detectada".to_string());

        let note = clean_field(record.ejecutivo.as_deref());
        let context = clean_field(record.contexto.as_deref());
        let transcription = clean_field(record.transcripcion.as_deref());
        let relevance = clean_field(record.relevancia.as_deref());

        let tooltip_source = note
            .clone()
            .or_else(|| context.clone())
            .or_else(|| transcription.clone())
            .unwrap_or_else(|| FALLBACK_TOOLTIP.to_string());
        let tooltip = format::truncate_chars(&tooltip_source, TOOLTIP_MAX_CHARS);

        let tema = record
            .termino_detectado
            .as_ref()
            .map(|terms| format::sanitize(&terms.raw_text()))
            .unwrap_or_default();
        let summary = Summary {
            contexto: note
                .clone()
                .or_else(|| context.clone())
                .unwrap_or_else(|| FALLBACK_CONTEXT.to_string()),
            relevancia: relevance.unwrap_or_else(|| FALLBACK_RELEVANCE.to_string()),
            puntos: tema.clone(),
            tema,
        };

        let video_url = record
            .url_video
            .as_deref()
            .map(str::trim)
            .filter(|url| format::is_valid_url(url))
            .map(str::to_string);

        let search = SearchFields {
            term: record
                .termino_detectado
                .as_ref()
                .map(|terms| terms.raw_text().to_lowercase())
                .unwrap_or_default(),
            note: lower_or_empty(record.ejecutivo.as_deref()),
            context: lower_or_empty(record.contexto.as_deref()),
            transcription: lower_or_empty(record.transcripcion.as_deref()),
        };

        let sort_date = record
            .fecha_detencion
            .as_deref()
            .and_then(format::parse_datetime)
            .or_else(|| {
                record
                    .fecha_programa
                    .as_deref()
                    .and_then(format::parse_datetime)
            })
            .unwrap_or_else(|| Utc::now().naive_utc());

        let card = CardView {
            program_name,
            rating,
            headline_term,
            terms,
            short_date: format::format_short_date(
                record
                    .fecha_detencion
                    .as_deref()
                    .or(record.fecha_programa.as_deref()),
            ),
            time_label: format::format_12_hour(record.hora_programa.as_deref()),
            tooltip,
            summary,
            video_url,
            transcription,
        };

        Self {
            record,
            card,
            search,
            sort_date,
            hidden: false,
            expanded: false,
            poster: PosterState::Missing,
        }
    }

    /// Case-insensitive substring match across the four searchable fields.
    /// `needle` must already be lowercased.
    pub fn matches_filter(&self, needle: &str) -> bool {
        needle.is_empty()
            || self.search.term.contains(needle)
            || self.search.note.contains(needle)
            || self.search.context.contains(needle)
            || self.search.transcription.contains(needle)
    }

    pub fn id(&self) -> &str {
        &self.record.id
    }

    pub fn has_video(&self) -> bool {
        self.card.video_url.is_some()
    }
}

fn clean_field(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(format::sanitize)
}

fn lower_or_empty(value: Option<&str>) -> String {
    value.map(|text| text.to_lowercase()).unwrap_or_default()
}

/// The ordered collection of loaded items plus the derived display order.
///
/// The backing sequence only ever grows (append for page loads, prepend for
/// realtime inserts) until `reset`. `display` is the render order: indices
/// into `items`, with the active filter applied. Hidden cards stay in
/// `display` and are dropped or dimmed at row-collection time.
#[derive(Default)]
pub struct FeedState {
    items: Vec<FeedItem>,
    display: Vec<usize>,
    offset: usize,
    filter: Option<String>,
    sort: SortOrder,
    show_hidden: bool,
}

impl FeedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears items, offset and the active filter. Sort direction and the
    /// show-hidden flag survive a reload.
    pub fn reset(&mut self) {
        self.items.clear();
        self.display.clear();
        self.offset = 0;
        self.filter = None;
    }

    /// Appends a fetched page. The offset advances by the raw fetched count;
    /// rows already present (a realtime insert overlapping the next page)
    /// are dropped. Returns the number of items actually added.
    pub fn append(&mut self, records: Vec<AlertRecord>) -> usize {
        let fetched = records.len();
        self.offset += fetched;

        let mut seen: HashSet<String> =
            self.items.iter().map(|item| item.record.id.clone()).collect();
        let mut fresh: Vec<usize> = Vec::new();
        for record in records {
            if !seen.insert(record.id.clone()) {
                continue;
            }
            self.items.push(FeedItem::from_record(record));
            fresh.push(self.items.len() - 1);
        }

        let added = fresh.len();
        // New rows render at the back, ordered among themselves by the
        // active sort; the rest of the view is left untouched.
        self.sort_indices(&mut fresh);
        let items = &self.items;
        let filter = self.filter.as_deref();
        let visible: Vec<usize> = fresh
            .into_iter()
            .filter(|&idx| passes(&items[idx], filter))
            .collect();
        self.display.extend(visible);
        added
    }

    /// Prepends one realtime insert. The item takes the visual front
    /// regardless of the active sort; only a later sort toggle, filter
    /// change or reload moves it. The offset is untouched.
    pub fn prepend(&mut self, record: AlertRecord) {
        let item = FeedItem::from_record(record);
        let visible = passes(&item, self.filter.as_deref());
        self.items.insert(0, item);
        for index in &mut self.display {
            *index += 1;
        }
        if visible {
            self.display.insert(0, 0);
        }
    }

    /// Applies (or toggles off) a filter. Re-applying the active filter
    /// clears it. Returns the filter now in effect.
    pub fn toggle_filter(&mut self, raw: &str) -> Option<String> {
        let needle = raw.trim().to_lowercase();
        if needle.is_empty() || self.filter.as_deref() == Some(needle.as_str()) {
            self.filter = None;
        } else {
            self.filter = Some(needle);
        }
        self.rebuild_display();
        self.filter.clone()
    }

    pub fn toggle_sort(&mut self) -> SortOrder {
        self.sort = self.sort.toggled();
        // Reorder only what is currently rendered; a stable sort keeps the
        // relative order of equal dates.
        let mut display = std::mem::take(&mut self.display);
        self.sort_indices(&mut display);
        self.display = display;
        self.sort
    }

    pub fn toggle_show_hidden(&mut self) -> bool {
        self.show_hidden = !self.show_hidden;
        self.show_hidden
    }

    /// Render order after both filter and hidden-state are applied.
    pub fn visible_rows(&self) -> Vec<usize> {
        self.display
            .iter()
            .copied()
            .filter(|&idx| self.show_hidden || !self.items[idx].hidden)
            .collect()
    }

    /// Expands the item at `index`, collapsing whichever card was expanded
    /// before. Expanding an already expanded card collapses it. Returns the
    /// indices that were collapsed.
    pub fn toggle_expanded(&mut self, index: usize) -> Vec<usize> {
        let was_expanded = self.items.get(index).is_some_and(|item| item.expanded);
        let mut collapsed = Vec::new();
        for (idx, item) in self.items.iter_mut().enumerate() {
            if item.expanded {
                item.expanded = false;
                collapsed.push(idx);
            }
        }
        if !was_expanded {
            if let Some(item) = self.items.get_mut(index) {
                item.expanded = true;
            }
        }
        collapsed
    }

    pub fn set_hidden(&mut self, index: usize, hidden: bool) {
        if let Some(item) = self.items.get_mut(index) {
            item.hidden = hidden;
            if hidden {
                item.expanded = false;
            }
        }
    }

    pub fn hidden_count(&self) -> usize {
        self.items.iter().filter(|item| item.hidden).count()
    }

    pub fn items(&self) -> &[FeedItem] {
        &self.items
    }

    pub fn item(&self, index: usize) -> Option<&FeedItem> {
        self.items.get(index)
    }

    pub fn item_mut(&mut self, index: usize) -> Option<&mut FeedItem> {
        self.items.get_mut(index)
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|item| item.record.id == id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    pub fn sort(&self) -> SortOrder {
        self.sort
    }

    pub fn show_hidden(&self) -> bool {
        self.show_hidden
    }

    fn rebuild_display(&mut self) {
        let items = &self.items;
        let filter = self.filter.as_deref();
        let mut display: Vec<usize> = (0..items.len())
            .filter(|&idx| passes(&items[idx], filter))
            .collect();
        self.sort_indices(&mut display);
        self.display = display;
    }

    fn sort_indices(&self, indices: &mut [usize]) {
        match self.sort {
            SortOrder::NewestFirst => {
                indices.sort_by(|&a, &b| self.items[b].sort_date.cmp(&self.items[a].sort_date));
            }
            SortOrder::OldestFirst => {
                indices.sort_by(|&a, &b| self.items[a].sort_date.cmp(&self.items[b].sort_date));
            }
        }
    }
}

fn passes(item: &FeedItem, filter: Option<&str>) -> bool {
    filter.map_or(true, |needle| item.matches_filter(needle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supabase::Terms;

    fn record(id: &str, detected_at: &str) -> AlertRecord {
        AlertRecord {
            id: id.to_string(),
            fecha_detencion: Some(detected_at.to_string()),
            ..AlertRecord::default()
        }
    }

    fn loaded_state(count: usize) -> FeedState {
        // Newest first, matching the backend's descending fetch order.
        let mut state = FeedState::new();
        let records = (0..count)
            .map(|idx| record(&format!("a-{idx}"), &format!("2025-08-{:02}T10:00:00Z", 28 - idx)))
            .collect();
        state.append(records);
        state
    }

    #[test]
    fn append_advances_count_and_offset() {
        let mut state = FeedState::new();
        let added = state.append(vec![
            record("1", "2025-08-03T10:00:00Z"),
            record("2", "2025-08-02T10:00:00Z"),
            record("3", "2025-08-01T10:00:00Z"),
        ]);
        assert_eq!(added, 3);
        assert_eq!(state.len(), 3);
        assert_eq!(state.offset(), 3);

        state.append(vec![record("4", "2025-07-30T10:00:00Z")]);
        assert_eq!(state.len(), 4);
        assert_eq!(state.offset(), 4);
    }

    #[test]
    fn append_drops_rows_already_present() {
        let mut state = FeedState::new();
        state.append(vec![record("1", "2025-08-03T10:00:00Z")]);
        let added = state.append(vec![
            record("1", "2025-08-03T10:00:00Z"),
            record("2", "2025-08-02T10:00:00Z"),
        ]);
        assert_eq!(added, 1);
        assert_eq!(state.len(), 2);
        // Offset still tracks the raw fetched count.
        assert_eq!(state.offset(), 3);
    }

    #[test]
    fn prepend_takes_the_visual_front_regardless_of_sort() {
        let mut state = loaded_state(3);
        state.toggle_sort();
        assert_eq!(state.sort(), SortOrder::OldestFirst);

        // Older than everything loaded; still renders first.
        state.prepend(record("nuevo", "2020-01-01T00:00:00Z"));
        assert_eq!(state.len(), 4);
        assert_eq!(state.offset(), 3);

        let rows = state.visible_rows();
        assert_eq!(state.item(rows[0]).unwrap().id(), "nuevo");
    }

    #[test]
    fn prepended_item_resorts_on_the_next_toggle() {
        let mut state = loaded_state(3);
        state.prepend(record("viejo", "2020-01-01T00:00:00Z"));
        let rows = state.visible_rows();
        assert_eq!(state.item(rows[0]).unwrap().id(), "viejo");

        state.toggle_sort();
        let rows = state.visible_rows();
        assert_eq!(state.item(rows[0]).unwrap().id(), "viejo");
        state.toggle_sort();
        let rows = state.visible_rows();
        assert_eq!(state.item(*rows.last().unwrap()).unwrap().id(), "viejo");
    }

    #[test]
    fn reset_clears_items_offset_and_filter() {
        let mut state = loaded_state(3);
        state.toggle_filter("a-");
        state.reset();
        assert!(state.is_empty());
        assert_eq!(state.offset(), 0);
        assert!(state.filter().is_none());
        assert!(state.visible_rows().is_empty());
    }

    #[test]
    fn filter_matches_any_searchable_field_case_insensitively() {
        let mut state = FeedState::new();
        let mut noted = record("1", "2025-08-03T10:00:00Z");
        noted.ejecutivo = Some("Canal 5 breaking news".to_string());
        let mut spoken = record("2", "2025-08-02T10:00:00Z");
        spoken.transcripcion = Some("se habló del BANCO central".to_string());
        let mut termed = record("3", "2025-08-01T10:00:00Z");
        termed.termino_detectado = Some(Terms::One("apagón".to_string()));
        state.append(vec![noted, spoken, termed]);

        state.toggle_filter("CANAL");
        let rows = state.visible_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(state.item(rows[0]).unwrap().id(), "1");

        state.toggle_filter("CANAL"); // toggle off
        state.toggle_filter("banco");
        let rows = state.visible_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(state.item(rows[0]).unwrap().id(), "2");

        state.toggle_filter("banco");
        state.toggle_filter("xyz");
        assert!(state.visible_rows().is_empty());
    }

    #[test]
    fn reapplying_the_active_filter_clears_it() {
        let mut state = loaded_state(3);
        assert_eq!(state.toggle_filter("a-1"), Some("a-1".to_string()));
        assert_eq!(state.visible_rows().len(), 0); // ids are not searchable
        assert_eq!(state.toggle_filter("a-1"), None);
        assert_eq!(state.visible_rows().len(), 3);
    }

    #[test]
    fn sort_round_trip_restores_order_with_distinct_dates() {
        let mut state = loaded_state(4);
        let original: Vec<String> = state
            .visible_rows()
            .iter()
            .map(|&idx| state.item(idx).unwrap().id().to_string())
            .collect();

        state.toggle_sort();
        let reversed: Vec<String> = state
            .visible_rows()
            .iter()
            .map(|&idx| state.item(idx).unwrap().id().to_string())
            .collect();
        assert_eq!(
            reversed,
            original.iter().rev().cloned().collect::<Vec<_>>()
        );

        state.toggle_sort();
        let restored: Vec<String> = state
            .visible_rows()
            .iter()
            .map(|&idx| state.item(idx).unwrap().id().to_string())
            .collect();
        assert_eq!(restored, original);
    }

    #[test]
    fn equal_dates_keep_their_relative_order() {
        let mut state = FeedState::new();
        state.append(vec![
            record("1", "2025-08-03T10:00:00Z"),
            record("2", "2025-08-03T10:00:00Z"),
            record("3", "2025-08-03T10:00:00Z"),
        ]);
        state.toggle_sort();
        let rows: Vec<&str> = state
            .visible_rows()
            .iter()
            .map(|&idx| state.item(idx).unwrap().id())
            .collect();
        assert_eq!(rows, vec!["1", "2", "3"]);
        state.toggle_sort();
        let rows: Vec<&str> = state
            .visible_rows()
            .iter()
            .map(|&idx| state.item(idx).unwrap().id())
            .collect();
        assert_eq!(rows, vec!["1", "2", "3"]);
    }

    #[test]
    fn at_most_one_item_is_expanded() {
        let mut state = loaded_state(3);
        state.toggle_expanded(0);
        assert!(state.item(0).unwrap().expanded);

        let collapsed = state.toggle_expanded(2);
        assert_eq!(collapsed, vec![0]);
        assert!(!state.item(0).unwrap().expanded);
        assert!(state.item(2).unwrap().expanded);
        assert_eq!(state.items().iter().filter(|item| item.expanded).count(), 1);

        let collapsed = state.toggle_expanded(2);
        assert_eq!(collapsed, vec![2]);
        assert_eq!(state.items().iter().filter(|item| item.expanded).count(), 0);
    }

    #[test]
    fn hidden_rows_are_skipped_unless_show_hidden() {
        let mut state = loaded_state(3);
        state.set_hidden(1, true);
        assert_eq!(state.visible_rows().len(), 2);
        assert_eq!(state.hidden_count(), 1);

        assert!(state.toggle_show_hidden());
        assert_eq!(state.visible_rows().len(), 3);

        state.set_hidden(1, false);
        assert!(!state.toggle_show_hidden());
        assert_eq!(state.visible_rows().len(), 3);
        assert_eq!(state.hidden_count(), 0);
    }

    #[test]
    fn card_mapping_derives_display_fields() {
        let row = AlertRecord {
            id: "a-1".to_string(),
            nombre_archivo: Some("Panorama Edición 730.mp4".to_string()),
            termino_detectado: Some(Terms::One("banco popular, reservas".to_string())),
            fecha_detencion: Some("2025-08-12T18:30:00Z".to_string()),
            hora_programa: Some("18:30".to_string()),
            url_video: Some("https://cdn.example.com/clip.mp4".to_string()),
            ..AlertRecord::default()
        };
        let item = FeedItem::from_record(row);

        assert_eq!(item.card.program_name, "Panorama Edición");
        assert!((8434..=11345).contains(&item.card.rating));
        assert_eq!(item.card.headline_term, "Banco popular");
        assert_eq!(item.card.terms, vec!["banco popular", "reservas"]);
        assert_eq!(item.card.short_date, "12 ago. 2025");
        assert_eq!(item.card.time_label, "6:30 PM");
        assert!(item.has_video());
        assert_eq!(item.card.summary.contexto, FALLBACK_CONTEXT);
        assert_eq!(item.card.summary.relevancia, FALLBACK_RELEVANCE);
    }

    #[test]
    fn tooltip_prefers_note_and_truncates() {
        let mut row = record("1", "2025-08-01T10:00:00Z");
        row.contexto = Some("x".repeat(200));
        let item = FeedItem::from_record(row);
        assert_eq!(item.card.tooltip.chars().count(), 153);
        assert!(item.card.tooltip.ends_with("..."));

        let bare = FeedItem::from_record(record("2", "2025-08-01T10:00:00Z"));
        assert_eq!(bare.card.tooltip, FALLBACK_TOOLTIP);
    }

    #[test]
    fn invalid_video_urls_are_ignored() {
        let mut row = record("1", "2025-08-01T10:00:00Z");
        row.url_video = Some("not-a-url".to_string());
        assert!(!FeedItem::from_record(row).has_video());
    }
}
