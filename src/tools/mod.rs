pub mod calendar;
pub mod date;
pub mod error;
pub mod executor;
pub mod holidays;
pub mod registry;
pub mod retry;
pub mod schema;
pub mod weather;

pub use calendar::{filter_events, parse_calendar, CalendarEvent, HolidayFilter};
pub use date::DateTool;
pub use error::ToolError;
pub use executor::ToolExecutor;
pub use holidays::{CalendarSource, HolidaysTool, HttpCalendarSource, StaticCalendarSource};
pub use registry::{Tool, ToolContext, ToolRegistry};
pub use retry::{FetchError, RetryPolicy, RetryingFetcher};
pub use schema::parameters_schema_for;
pub use weather::{format_weather_report, WeatherClient, WeatherProvider, WeatherTool};
