mod event_view;
mod painter;
mod table;

pub(crate) use self::event_view::{
    DeviceTableView, EventView, ExerciseReadView, ExerciseTableView, RecordStatusView,
};
pub(crate) use self::painter::Painter;
