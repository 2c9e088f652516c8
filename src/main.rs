fn main() {
    leapfrog_sph::start();
}
