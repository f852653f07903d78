use utoipa::OpenApi;

use crate::handlers::{ClubDiagnostics, ClubSlots, SearchMode, SearchResponse};
use crate::models::{Slot, SlotStatus};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz_live,
        crate::handlers::healthz_ready,
        crate::handlers::get_slots,
        crate::handlers::get_debug
    ),
    components(schemas(Slot, SlotStatus, SearchMode, ClubSlots, SearchResponse, ClubDiagnostics)),
    tags(
        (name = "slots", description = "Fitness class slot search")
    ),
)]
pub struct ApiDoc;
