// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const PAGE_SIZE_CHOICES: [u32; 4] = [10, 20, 50, 100];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageButton {
    Page(u32),
    Ellipsis,
}

/// Where the table sits inside a paginated collection. Pages are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: u32,
    pub page_size: u32,
    pub total_count: u64,
}

impl Default for PageWindow {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            total_count: 0,
        }
    }
}

impl PageWindow {
    pub fn total_pages(&self) -> u32 {
        let size = u64::from(self.page_size.max(1));
        u32::try_from(self.total_count.div_ceil(size)).unwrap_or(u32::MAX)
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }

    pub fn contains(&self, page: u32) -> bool {
        (1..=self.total_pages()).contains(&page)
    }

    /// First and last pages, the current page and its neighbours, with an
    /// ellipsis standing in for each skipped run.
    pub fn page_buttons(&self) -> Vec<PageButton> {
        let total = self.total_pages();
        if total == 0 {
            return Vec::new();
        }
        let current = self.page.clamp(1, total);
        let mut buttons = Vec::new();
        for n in 1..=total {
            if n == 1 || n == total || n.abs_diff(current) <= 1 {
                buttons.push(PageButton::Page(n));
            } else if (n + 2 == current && n > 1) || (n == current + 2 && n < total) {
                buttons.push(PageButton::Ellipsis);
            }
        }
        buttons
    }

    pub fn label(&self) -> String {
        format!("Página {} de {}", self.page, self.total_pages().max(1))
    }
}
