/// a supervised worker that polls a fetch capability on a fixed interval and
/// remembers every value it has seen.
/// use cases:
/// * watching a slowly changing source and asking "has this value shown up yet?"
/// * sampling an external counter without coupling readers to the source
/// * test doubles: swap the capability for a fixed or failing one
///
/// Ticks and queries share one bounded mailbox, so a worker handles them strictly
/// in arrival order.  A slow fetch holds up the queries queued behind it; that is
/// the price of never needing a lock around the seen list.
///
pub mod handler;
pub mod supervisor;
pub mod ticker;
pub mod worker;
