//! Demo Mode - Simulated oven controller
//!
//! Answers the controller protocol the way the firmware does, so the client can
//! be driven without hardware. A first-order thermal model heats the oven while
//! a recipe runs.

use byteorder::{BigEndian, ByteOrder};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::{duplex, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::model::{Pid, RecipeStep, Status, MAX_POWER, MAX_STEPS, MIN_STEPS, PWM_STEPS};
use crate::protocol::codec::{self, RECIPE_STEP_LEN};
use crate::protocol::{Command, DynSerial, LinkConfig, OpenFuture, OpenedPort, OvenError, PortProvider};

/// Read buffer for the simulated link; larger than the controller's 64 byte
/// packets since reads from a pipe do not preserve write boundaries
const READ_BUFFER_SIZE: usize = 1024;

/// Length of a SetAmbient message
const AMBIENT_MESSAGE_LEN: usize = 3;

/// Thermal resistance to ambient (°C/W)
const THERMAL_RESISTANCE: f32 = 0.2;

/// Thermal capacitance of the oven (J/°C)
const THERMAL_CAPACITANCE: f32 = 20000.0;

/// Proportional gain used while the controller's PID is still all zero
const FALLBACK_GAIN: f32 = 10.0;

/// Device-side model of the oven controller
pub struct SimulatedOven {
    status: Status,
    recipe: Vec<RecipeStep>,
    pid: Pid,
    ambient: f32,
    temperature: f32,
    elapsed: Duration,
    pwm: u8,
    /// Swallow requests without replying
    unresponsive: bool,
    /// Every request as it arrived
    requests: Vec<Vec<u8>>,
    rng: StdRng,
}

impl Default for SimulatedOven {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedOven {
    /// A controller fresh out of reset
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Reproducible simulation
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            status: Status::NeedRestart,
            recipe: Vec::new(),
            pid: Pid::ZERO,
            ambient: -14.0,
            temperature: 20.0,
            elapsed: Duration::ZERO,
            pwm: 0,
            unresponsive: false,
            requests: Vec::new(),
            rng,
        }
    }

    /// Current controller status
    pub fn status(&self) -> Status {
        self.status
    }

    /// The last recipe accepted
    pub fn recipe(&self) -> &[RecipeStep] {
        &self.recipe
    }

    /// Adopted PID coefficients
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Ambient temperature last reported by the host, in °C
    pub fn ambient(&self) -> f32 {
        self.ambient
    }

    /// Modelled oven temperature in °C
    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    /// Heater PWM duty
    pub fn output(&self) -> u8 {
        self.pwm
    }

    /// Requests received so far, one entry per message
    pub fn requests(&self) -> &[Vec<u8>] {
        &self.requests
    }

    /// Force the oven temperature
    pub fn set_temperature(&mut self, celsius: f32) {
        self.temperature = celsius;
    }

    /// Force the heater duty, clamped to [`PWM_STEPS`]
    pub fn set_output(&mut self, pwm: u8) {
        self.pwm = pwm.min(PWM_STEPS);
    }

    /// Move the recipe clock
    pub fn set_elapsed(&mut self, elapsed: Duration) {
        self.elapsed = elapsed;
    }

    /// Latch a controller fault
    pub fn fault(&mut self) {
        self.status = Status::Faulted;
        self.pwm = 0;
    }

    /// Stop (or resume) answering requests
    pub fn set_unresponsive(&mut self, unresponsive: bool) {
        self.unresponsive = unresponsive;
    }

    /// Handle one received message and produce the reply, if the command has one
    pub fn handle(&mut self, request: &[u8]) -> Option<Vec<u8>> {
        self.requests.push(request.to_vec());
        if self.unresponsive {
            return None;
        }

        let command = request.first().copied().and_then(Command::from_opcode)?;
        match command {
            Command::Start => {
                if self.status == Status::Standby {
                    self.status = Status::Running;
                    self.elapsed = Duration::ZERO;
                }
                Some(vec![self.status.code()])
            }
            Command::Stop => {
                if self.status == Status::Running {
                    self.status = Status::Standby;
                    self.pwm = 0;
                }
                Some(vec![self.status.code()])
            }
            Command::StartRecipe => Some(self.receive_recipe(request)),
            Command::GetCurrentSample => Some(self.sample_bytes()),
            Command::GetStatus => {
                let reply = vec![self.status.code()];
                if self.status == Status::NeedRestart {
                    self.status = Status::WaitingForRecipe;
                }
                Some(reply)
            }
            Command::SetAmbient => {
                if request.len() > 2 {
                    self.ambient = BigEndian::read_i16(&request[1..3]) as f32 / 4.0;
                }
                None
            }
            Command::SetPID => {
                if request.len() < 13 {
                    return None;
                }
                let mut gains = [0f32; 3];
                BigEndian::read_f32_into(&request[1..13], &mut gains);
                self.pid = Pid::from_array(gains);
                Some(self.pid_bytes())
            }
            Command::GetPID => Some(self.pid_bytes()),
            Command::EndRecipe => None,
        }
    }

    fn receive_recipe(&mut self, request: &[u8]) -> Vec<u8> {
        let len = request.len();
        let acceptable = len >= MIN_STEPS * RECIPE_STEP_LEN + 2
            && len <= MAX_STEPS * RECIPE_STEP_LEN + 2
            && len % RECIPE_STEP_LEN == 2
            && request[len - 1] == Command::EndRecipe.opcode()
            && self.status != Status::Running;

        if !acceptable {
            // Same length, wrong content: the client fails verification without waiting
            return vec![0u8; len];
        }

        self.recipe = request[1..len - 1]
            .chunks_exact(RECIPE_STEP_LEN)
            .map(|c| RecipeStep::from_raw(BigEndian::read_u16(&c[0..2]), BigEndian::read_i16(&c[2..4])))
            .collect();
        self.status = Status::Standby;
        codec::encode_recipe(&self.recipe)
    }

    fn sample_bytes(&self) -> Vec<u8> {
        let mut reply = vec![0u8; codec::SAMPLE_RESPONSE_LEN];
        let ticks = (self.elapsed.as_secs() / 4).min(u16::MAX as u64) as u16;
        BigEndian::write_u16(&mut reply[0..2], ticks);
        BigEndian::write_i16(&mut reply[2..4], (self.temperature * 4.0) as i16);
        BigEndian::write_i16(&mut reply[4..6], (self.ambient * 4.0) as i16);
        reply[6] = self.pwm;
        reply
    }

    fn pid_bytes(&self) -> Vec<u8> {
        let mut reply = vec![0u8; codec::PID_RESPONSE_LEN];
        BigEndian::write_f32_into(&self.pid.to_array(), &mut reply);
        reply
    }

    /// Recipe set point at the current time, linearly interpolated between steps
    fn set_point(&self) -> Option<f32> {
        let t = self.elapsed.as_secs_f32();
        let next = self.recipe.iter().position(|s| s.time().as_secs_f32() >= t)?;
        let to = self.recipe[next];
        if next == 0 {
            return Some(to.temperature());
        }
        let from = self.recipe[next - 1];
        let span = (to.time() - from.time()).as_secs_f32();
        if span <= 0.0 {
            return Some(to.temperature());
        }
        let ratio = (t - from.time().as_secs_f32()) / span;
        Some(from.temperature() + (to.temperature() - from.temperature()) * ratio)
    }

    /// Advance the thermal model
    pub fn tick(&mut self, dt: Duration) {
        if self.status == Status::Running {
            self.elapsed += dt;
            match self.set_point() {
                Some(target) => {
                    let gain = if self.pid.proportional > 0.0 {
                        self.pid.proportional
                    } else {
                        FALLBACK_GAIN
                    };
                    let duty = ((target - self.temperature) * gain).clamp(0.0, PWM_STEPS as f32);
                    self.pwm = duty as u8;
                }
                None => {
                    // Past the last step
                    self.status = Status::Standby;
                    self.pwm = 0;
                }
            }
        }

        let power = MAX_POWER * self.pwm as f32 / PWM_STEPS as f32;
        let loss = (self.temperature - self.ambient) / THERMAL_RESISTANCE;
        let noise = self.rng.gen_range(-0.05..0.05);
        self.temperature += (power - loss) * dt.as_secs_f32() / THERMAL_CAPACITANCE + noise;
    }
}

/// Serve the controller protocol over a byte stream until the other end hangs up
pub async fn serve<S>(oven: Arc<Mutex<SimulatedOven>>, mut io: S) -> std::io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buffer = [0u8; READ_BUFFER_SIZE];
    loop {
        let n = io.read(&mut buffer).await?;
        if n == 0 {
            return Ok(());
        }

        for message in split_messages(&buffer[..n]) {
            let reply = lock(&oven).handle(message);
            if let Some(reply) = reply {
                io.write_all(&reply).await?;
                io.flush().await?;
            }
        }
    }
}

/// Split one read into messages.
///
/// SetAmbient gets no reply, so the next request can follow it without a pause
/// and arrive in the same read. Every other command waits for its reply, so
/// whatever follows any leading SetAmbient frames is a single message.
fn split_messages(mut chunk: &[u8]) -> Vec<&[u8]> {
    let mut messages = Vec::new();
    while chunk.len() > AMBIENT_MESSAGE_LEN && chunk[0] == Command::SetAmbient.opcode() {
        let (ambient, rest) = chunk.split_at(AMBIENT_MESSAGE_LEN);
        messages.push(ambient);
        chunk = rest;
    }
    if !chunk.is_empty() {
        messages.push(chunk);
    }
    messages
}

fn lock(oven: &Mutex<SimulatedOven>) -> MutexGuard<'_, SimulatedOven> {
    oven.lock().unwrap_or_else(|e| e.into_inner())
}

/// Port provider that connects the client to a [`SimulatedOven`]
#[derive(Clone)]
pub struct DemoPortProvider {
    oven: Arc<Mutex<SimulatedOven>>,
    present: Arc<AtomicBool>,
    opens: Arc<AtomicUsize>,
}

impl Default for DemoPortProvider {
    fn default() -> Self {
        Self::new(SimulatedOven::new())
    }
}

impl DemoPortProvider {
    /// Serve `oven` to every link this provider opens
    pub fn new(oven: SimulatedOven) -> Self {
        Self {
            oven: Arc::new(Mutex::new(oven)),
            present: Arc::new(AtomicBool::new(true)),
            opens: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Inspect or modify the simulated controller
    pub fn with_oven<R>(&self, f: impl FnOnce(&mut SimulatedOven) -> R) -> R {
        f(&mut lock(&self.oven))
    }

    /// Make discovery fail as if the USB cable were pulled
    pub fn unplug(&self) {
        self.present.store(false, Ordering::SeqCst);
    }

    /// Undo [`unplug`](Self::unplug)
    pub fn plug_in(&self) {
        self.present.store(true, Ordering::SeqCst);
    }

    /// How many times a link has been opened
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl PortProvider for DemoPortProvider {
    fn open<'a>(&'a self, config: &'a LinkConfig) -> OpenFuture<'a> {
        Box::pin(async move {
            if !self.present.load(Ordering::SeqCst) {
                return Err(OvenError::NoDevice(config.vendor_hint.clone()));
            }
            self.opens.fetch_add(1, Ordering::SeqCst);

            let (client, device) = duplex(1024);
            let oven = self.oven.clone();
            tokio::spawn(async move {
                if let Err(e) = serve(oven, device).await {
                    tracing::debug!("simulated oven stopped: {}", e);
                }
            });

            Ok(OpenedPort {
                name: "demo".to_string(),
                io: Box::new(client) as DynSerial,
            })
        })
    }
}
