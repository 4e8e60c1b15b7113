//! Embedded corridor network and trip chains.
//!
//! ```text
//!   west ──L0──▶ a ──L1──▶ b ──L2──▶ east
//!                ▲         │
//!               L3        L4
//!                │         ▼
//!              north     south
//!
//!   east ──L5──▶ west   (return road)
//! ```
//!
//! The arterial (L0–L2) has two lanes; the side streets have one.  L1 is
//! split into two segments so the lane closure on its downstream half backs
//! traffic up into the upstream half.

/// One row per segment; see `meso_network::load_network_reader`.
pub const NETWORK_CSV: &str = "\
link_id,from,to,seq,length_m,lanes,max_speed_mps,capacity_vph\n\
0,0,1,0,400.0,2,13.9,3600\n\
1,1,2,0,250.0,2,13.9,3600\n\
1,1,2,1,150.0,2,13.9,3600\n\
2,2,3,0,500.0,2,16.7,3600\n\
3,4,1,0,300.0,1,11.1,1200\n\
4,2,5,0,300.0,1,11.1,1200\n\
5,3,0,0,1200.0,2,16.7,3600\n\
";

pub const WEST: u32 = 0;
pub const EAST: u32 = 3;
pub const NORTH: u32 = 4;
pub const SOUTH: u32 = 5;

/// The second segment of L1, just upstream of intersection `b`.
pub const CLOSED_SEGMENT: u32 = 2;

/// Build the trip-chain CSV: `commuters` arterial commuters departing every
/// `headway_secs`, every third one starting from the north side street and
/// every fourth one turning south.  Every fifth commuter stops for a short
/// errand at `east` and drives home on the return road.
pub fn trips_csv(commuters: u32, headway_secs: f64) -> String {
    let mut out = String::from("person_id,seq,kind,origin,destination,start_secs,end_secs\n");
    for i in 0..commuters {
        let start = f64::from(i) * headway_secs;
        let origin = if i % 3 == 0 { NORTH } else { WEST };
        let destination = if i % 4 == 0 { SOUTH } else { EAST };
        out.push_str(&format!("{i},0,trip,{origin},{destination},{start},0\n"));
        if i % 5 == 0 && destination == EAST {
            let errand_end = start + 900.0;
            out.push_str(&format!("{i},1,activity,{EAST},{EAST},{start},{errand_end}\n"));
            out.push_str(&format!("{i},2,trip,{EAST},{WEST},{errand_end},0\n"));
        }
    }
    out
}
