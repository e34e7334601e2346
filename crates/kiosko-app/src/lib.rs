// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod columns;
pub mod edit;
pub mod fetch;
pub mod forms;
pub mod ids;
pub mod model;
pub mod paging;
pub mod state;
pub mod table;
pub mod tickets;

pub use ids::*;
pub use model::*;
pub use state::*;
