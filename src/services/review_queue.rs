use crate::models::application::Application;

/// Rows per page on the admin dashboard
pub const PER_PAGE: usize = 5;

fn contains(field: Option<&str>, needle: &str) -> bool {
    field.is_some_and(|value| value.to_lowercase().contains(needle))
}

/// Partial, case-insensitive search across the identifying fields of each
/// application. A blank term keeps everything.
pub fn filter<'a>(applications: &'a [Application], term: &str) -> Vec<&'a Application> {
    let needle = term.trim().to_lowercase();
    if needle.is_empty() {
        return applications.iter().collect();
    }

    applications
        .iter()
        .filter(|app| {
            contains(Some(&app.id), &needle)
                || contains(app.trx_id.as_deref(), &needle)
                || contains(app.amount.as_deref(), &needle)
                || contains(Some(&app.student_id), &needle)
                || contains(Some(&app.first_name), &needle)
                || contains(Some(&app.last_name), &needle)
                || contains(Some(&app.email), &needle)
        })
        .collect()
}

/// One page of a list, with the numbers the dashboard footer needs
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: usize,
    pub total_pages: usize,
    pub total_items: usize,
    pub per_page: usize,
}

impl<T> Page<T> {
    /// Slices out `requested` (1-based, clamped to the valid range)
    pub fn of(all: Vec<T>, requested: usize, per_page: usize) -> Self {
        let per_page = per_page.max(1);
        let total_items = all.len();
        let total_pages = total_items.div_ceil(per_page).max(1);
        let number = requested.clamp(1, total_pages);

        let items = all
            .into_iter()
            .skip((number - 1) * per_page)
            .take(per_page)
            .collect();

        Self {
            items,
            number,
            total_pages,
            total_items,
            per_page,
        }
    }

    /// Converts the rows while keeping the page numbers
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            number: self.number,
            total_pages: self.total_pages,
            total_items: self.total_items,
            per_page: self.per_page,
        }
    }

    /// 1-based position of the first row on this page
    pub fn first_index(&self) -> usize {
        if self.total_items == 0 {
            0
        } else {
            (self.number - 1) * self.per_page + 1
        }
    }

    /// 1-based position of the last row on this page
    pub fn last_index(&self) -> usize {
        (self.number * self.per_page).min(self.total_items)
    }

    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    pub fn has_next(&self) -> bool {
        self.number < self.total_pages
    }

    /// Pagination controls are only shown when there is more than one page
    pub fn is_paginated(&self) -> bool {
        self.total_items > self.per_page
    }
}
