// Copyright (c) 2026 Helion Contributors
//
// Licensed under the MIT license. See LICENSE for details.
//
// Shared write paths used both by the automation cycle (C6, starting or preempting a rule)
// and by quick-control overrides (C9): compose a segment, call `ApplyScheduler` + `SetFlag`,
// settle, then verify before the caller is allowed to trust the write (§4.6 steps 8-9). The
// verification barrier lives here rather than in `helion-clients` because it is a domain
// decision ("does slot 0 match what we asked for"), not a transport concern.

use std::time::Duration;

use helion_clients::{CallOrigin, ClientPool};
use helion_types::scheduler::{Segment, Slot};

use crate::error::CoreResult;

const APPLY_SETTLE: Duration = Duration::from_secs(3);
const VERIFY_RETRY_DELAY: Duration = Duration::from_millis(500);
const VERIFY_MAX_ATTEMPTS: u32 = 3;

const CLEAR_SETTLE: Duration = Duration::from_millis(2_500);

/// What slot 0 must look like for the verification read to accept the apply (§4.6.8.5).
#[derive(Debug, Clone, Copy)]
pub struct SlotExpectation {
    pub start_hh: u8,
    pub start_mm: u8,
    pub end_hh: u8,
    pub end_mm: u8,
}

impl SlotExpectation {
    pub fn from_slot(slot: Slot) -> Self {
        Self { start_hh: slot.start_hh, start_mm: slot.start_mm, end_hh: slot.end_hh, end_mm: slot.end_mm }
    }

    fn matches(self, slot: Slot) -> bool {
        slot.matches_window(self.start_hh, self.start_mm, self.end_hh, self.end_mm)
    }
}

/// Apply + flag + settle + verify. Returns `Ok(true)` only once a verification read confirms
/// slot 0 matches `expect`; `Ok(false)` means the write must be treated as not-yet-active —
/// the caller must not advance `activeRule` and should let the next cycle retry.
pub async fn apply_and_verify(
    clients: &ClientPool,
    device_serial: &str,
    segment: Segment,
    expect: SlotExpectation,
    origin: CallOrigin,
) -> CoreResult<bool> {
    clients.inverter.apply_scheduler(&clients.inverter_breaker, device_serial, segment, origin).await?;
    clients.inverter.set_flag(&clients.inverter_breaker, device_serial, true, origin).await?;
    tokio::time::sleep(APPLY_SETTLE).await;

    for attempt in 0..VERIFY_MAX_ATTEMPTS {
        let readback = clients.inverter.get_scheduler(&clients.inverter_breaker, device_serial).await;
        match readback {
            Ok(segment) if expect.matches(segment.slot0()) => return Ok(true),
            Ok(_) => {}
            Err(err) if attempt + 1 == VERIFY_MAX_ATTEMPTS => return Err(err.into()),
            Err(_) => {}
        }
        if attempt + 1 < VERIFY_MAX_ATTEMPTS {
            tokio::time::sleep(VERIFY_RETRY_DELAY).await;
        }
    }
    Ok(false)
}

/// Clear-active protocol (§4.6.9). The 3-attempt, fixed-1.2s-backoff retry lives inside
/// [`helion_clients::InverterClient::clear_scheduler`]; this just settles on success.
/// Returns `Ok(true)` on success; `Ok(false)` means `activeRule` must be preserved and the
/// caller should bump `clearFailureAttempts`.
pub async fn clear_active(clients: &ClientPool, device_serial: &str, origin: CallOrigin) -> CoreResult<bool> {
    match clients.inverter.clear_scheduler(&clients.inverter_breaker, device_serial, origin).await {
        Ok(()) => {
            tokio::time::sleep(CLEAR_SETTLE).await;
            Ok(true)
        }
        Err(_) => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use helion_types::rule::WorkMode;
    use mockito::Server;

    use super::*;

    fn pool(server: &Server) -> ClientPool {
        ClientPool::new(server.url(), "tok", server.url(), "tok", server.url(), "tok").unwrap()
    }

    fn active_slot0() -> Slot {
        Slot { enable: true, work_mode: WorkMode::ForceDischarge, start_hh: 10, start_mm: 0, end_hh: 10, end_mm: 30, min_soc_on_grid: 20, fd_soc: 20, fd_pwr: 3000, max_soc: 100 }
    }

    #[tokio::test(start_paused = true)]
    async fn apply_and_verify_succeeds_when_readback_matches() {
        let mut server = Server::new_async().await;
        let apply_mock = server.mock("POST", "/api/v1/scheduler/apply").with_status(200).with_body(r#"{"errno":0,"result":null}"#).create_async().await;
        let flag_mock = server.mock("POST", "/api/v1/scheduler/flag").with_status(200).with_body(r#"{"errno":0,"result":null}"#).create_async().await;
        let slot0 = active_slot0();
        let get_body = format!(
            r#"{{"errno":0,"result":[{{"enable":true,"workMode":"ForceDischarge","startHh":{},"startMm":{},"endHh":{},"endMm":{},"minSocOnGrid":{},"fdSoc":{},"fdPwr":{},"maxSoc":{}}},{{"enable":false,"workMode":"SelfUse","startHh":0,"startMm":0,"endHh":0,"endMm":0,"minSocOnGrid":0,"fdSoc":0,"fdPwr":0,"maxSoc":100}},{{"enable":false,"workMode":"SelfUse","startHh":0,"startMm":0,"endHh":0,"endMm":0,"minSocOnGrid":0,"fdSoc":0,"fdPwr":0,"maxSoc":100}},{{"enable":false,"workMode":"SelfUse","startHh":0,"startMm":0,"endHh":0,"endMm":0,"minSocOnGrid":0,"fdSoc":0,"fdPwr":0,"maxSoc":100}},{{"enable":false,"workMode":"SelfUse","startHh":0,"startMm":0,"endHh":0,"endMm":0,"minSocOnGrid":0,"fdSoc":0,"fdPwr":0,"maxSoc":100}},{{"enable":false,"workMode":"SelfUse","startHh":0,"startMm":0,"endHh":0,"endMm":0,"minSocOnGrid":0,"fdSoc":0,"fdPwr":0,"maxSoc":100}},{{"enable":false,"workMode":"SelfUse","startHh":0,"startMm":0,"endHh":0,"endMm":0,"minSocOnGrid":0,"fdSoc":0,"fdPwr":0,"maxSoc":100}},{{"enable":false,"workMode":"SelfUse","startHh":0,"startMm":0,"endHh":0,"endMm":0,"minSocOnGrid":0,"fdSoc":0,"fdPwr":0,"maxSoc":100}}]}}"#,
            slot0.start_hh, slot0.start_mm, slot0.end_hh, slot0.end_mm, slot0.min_soc_on_grid, slot0.fd_soc, slot0.fd_pwr, slot0.max_soc
        );
        let get_mock = server.mock("GET", mockito::Matcher::Regex(r"^/api/v1/scheduler/get".into())).with_status(200).with_body(get_body).create_async().await;

        let clients = pool(&server);
        let segment = Segment::for_active_slot(slot0);
        let ok = apply_and_verify(&clients, "SN1", segment, SlotExpectation::from_slot(slot0), CallOrigin::User).await.unwrap();

        assert!(ok);
        apply_mock.assert_async().await;
        flag_mock.assert_async().await;
        get_mock.assert_async().await;
    }

    #[tokio::test(start_paused = true)]
    async fn apply_and_verify_gives_up_after_three_mismatched_reads() {
        let mut server = Server::new_async().await;
        server.mock("POST", "/api/v1/scheduler/apply").with_status(200).with_body(r#"{"errno":0,"result":null}"#).create_async().await;
        server.mock("POST", "/api/v1/scheduler/flag").with_status(200).with_body(r#"{"errno":0,"result":null}"#).create_async().await;
        let mismatch_body = r#"{"errno":0,"result":[
            {"enable":false,"workMode":"SelfUse","startHh":0,"startMm":0,"endHh":0,"endMm":0,"minSocOnGrid":0,"fdSoc":0,"fdPwr":0,"maxSoc":100},
            {"enable":false,"workMode":"SelfUse","startHh":0,"startMm":0,"endHh":0,"endMm":0,"minSocOnGrid":0,"fdSoc":0,"fdPwr":0,"maxSoc":100},
            {"enable":false,"workMode":"SelfUse","startHh":0,"startMm":0,"endHh":0,"endMm":0,"minSocOnGrid":0,"fdSoc":0,"fdPwr":0,"maxSoc":100},
            {"enable":false,"workMode":"SelfUse","startHh":0,"startMm":0,"endHh":0,"endMm":0,"minSocOnGrid":0,"fdSoc":0,"fdPwr":0,"maxSoc":100},
            {"enable":false,"workMode":"SelfUse","startHh":0,"startMm":0,"endHh":0,"endMm":0,"minSocOnGrid":0,"fdSoc":0,"fdPwr":0,"maxSoc":100},
            {"enable":false,"workMode":"SelfUse","startHh":0,"startMm":0,"endHh":0,"endMm":0,"minSocOnGrid":0,"fdSoc":0,"fdPwr":0,"maxSoc":100},
            {"enable":false,"workMode":"SelfUse","startHh":0,"startMm":0,"endHh":0,"endMm":0,"minSocOnGrid":0,"fdSoc":0,"fdPwr":0,"maxSoc":100},
            {"enable":false,"workMode":"SelfUse","startHh":0,"startMm":0,"endHh":0,"endMm":0,"minSocOnGrid":0,"fdSoc":0,"fdPwr":0,"maxSoc":100}
        ]}"#;
        let get_mock = server
            .mock("GET", mockito::Matcher::Regex(r"^/api/v1/scheduler/get".into()))
            .with_status(200)
            .with_body(mismatch_body)
            .expect(3)
            .create_async()
            .await;

        let clients = pool(&server);
        let slot0 = active_slot0();
        let segment = Segment::for_active_slot(slot0);
        let ok = apply_and_verify(&clients, "SN1", segment, SlotExpectation::from_slot(slot0), CallOrigin::User).await.unwrap();

        assert!(!ok);
        get_mock.assert_async().await;
    }

    #[tokio::test(start_paused = true)]
    async fn clear_active_succeeds_on_first_attempt() {
        let mut server = Server::new_async().await;
        let mock = server.mock("POST", "/api/v1/scheduler/apply").with_status(200).with_body(r#"{"errno":0,"result":null}"#).create_async().await;
        let clients = pool(&server);

        let ok = clear_active(&clients, "SN1", CallOrigin::System).await.unwrap();

        assert!(ok);
        mock.assert_async().await;
    }

    #[tokio::test(start_paused = true)]
    async fn clear_active_gives_up_after_exhausting_retries() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/scheduler/apply")
            .with_status(500)
            .with_body("boom")
            .expect(3)
            .create_async()
            .await;
        let clients = pool(&server);

        let ok = clear_active(&clients, "SN1", CallOrigin::System).await.unwrap();

        assert!(!ok);
        mock.assert_async().await;
    }
}
