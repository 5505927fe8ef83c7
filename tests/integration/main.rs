mod delivery;
mod notifications;
mod renewal_flow;
mod test_utils;
