/*!
# FreeLytix

An analytics dashboard for a freelance-marketplace dataset, built in Rust.

## Overview

FreeLytix loads a table of freelancer listings (synthesizing a deterministic
sample on first run if no file is present), renders a fixed catalog of 25
chart images from it, and serves the results through a small web application
with user accounts.

## Architecture

The application follows a classic server-rendered architecture:

### Analytics Layer
- **Technologies**: Rust, plotters
- **Core Components**:
  - Dataset - Typed, column-oriented table loaded from CSV
  - Statistics - Grouped aggregations, correlation, kernel density estimation
  - Chart Renderers - Bar, grouped bar, box plot, density, heatmap, scatter matrix
  - Report Generator - Recipe catalog, manifest-backed caching, failure isolation

### Web Layer
- **Technologies**: axum, handlebars
- **Core Components**:
  - Page Handlers - Home metrics, chart gallery, about, dataset download
  - Accounts - Registration with email confirmation, sessions, profile, settings
  - Mailer - SMTP confirmation emails via lettre
  - Exports - CSV and XLSX downloads of the dataset

## Key Features

- Deterministic synthetic dataset (fixed seed) when no data file exists
- 25-chart report generated once and cached via an artifact manifest
- Per-chart failure isolation; one bad recipe never blanks the gallery
- Argon2 password hashing and cookie sessions
- Per-user dashboard preferences (theme, currency, export format, ...)

## Modules

- **config**: Environment-driven runtime configuration
- **dataset**: CSV loading, typing and the synthetic generator
- **stats**: Aggregations, summary metrics, correlation, KDE
- **charts**: plotters-based PNG renderers
- **report**: The chart catalog and the cached generation pipeline
- **login**: User accounts, sessions and the account page handlers
- **mailer**: Confirmation email delivery
- **downloader**: CSV / XLSX dataset exports
- **app**: Routing, shared state and the page handlers
*/

// Re-export all modules so they appear in the documentation
pub mod app;
pub mod charts;
pub mod config;
pub mod dataset;
pub mod downloader;
pub mod login;
pub mod mailer;
pub mod report;
pub mod stats;

/// Re-export everything from these modules to make it easier to use
pub use charts::*;
pub use config::*;
pub use dataset::*;
pub use downloader::*;
pub use mailer::*;
pub use report::*;
pub use stats::*;
